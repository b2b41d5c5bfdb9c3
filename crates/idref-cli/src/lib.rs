//! # idref-cli: Operator CLI for ID Reference Handling
//!
//! Provides the `idref` command-line interface over the same handler
//! registry the object store uses, so an operator can check and exercise
//! the external services by hand.
//!
//! ## Subcommands
//!
//! - `idref status`: Health of every configured external service.
//! - `idref resolve`: Resolve the ids extracted from a JSON document.
//! - `idref grant`: Grant read access to ids of one type.
//!
//! ```bash
//! idref --config services.yaml status
//! IDREF_TOKEN=... idref resolve --user amy --document ids.json
//! idref grant --type handle --public KBH_1 KBH_2
//! ```
//!
//! Argument parsing lives in `main.rs`; each `run_*` function takes an
//! already-built registry and an output sink, and returns the process exit
//! code.

pub mod grant;
pub mod resolve;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use idref_client::ExternalServicesConfig;

/// Load service configuration from `path`, or from `IDREF_*` environment
/// variables when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ExternalServicesConfig> {
    match path {
        Some(p) => ExternalServicesConfig::from_yaml_file(p)
            .with_context(|| format!("failed to load configuration from {}", p.display())),
        None => ExternalServicesConfig::from_env().context("failed to load configuration from the environment"),
    }
}
