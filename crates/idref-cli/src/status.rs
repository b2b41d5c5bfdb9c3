//! # Status Subcommand
//!
//! Prints the dependency status of every configured service as a JSON
//! array. Unconfigured services are not listed.

use std::io::Write;

use anyhow::{Context, Result};
use idref_core::{AssociatedObject, IdReferenceHandlerSetFactoryBuilder};

/// Write the status list to `out`. Exit code 1 if any service is unhealthy.
pub fn run_status<T: AssociatedObject>(
    registry: &IdReferenceHandlerSetFactoryBuilder<T>,
    out: &mut dyn Write,
) -> Result<u8> {
    let statuses = registry.dependency_status();
    let unhealthy = statuses.iter().filter(|s| !s.ok).count();
    for s in statuses.iter().filter(|s| !s.ok) {
        tracing::warn!(dependency = %s.name, message = %s.message, "dependency unhealthy");
    }
    serde_json::to_writer_pretty(&mut *out, &statuses).context("failed to write status")?;
    writeln!(out)?;
    Ok(if unhealthy == 0 { 0 } else { 1 })
}
