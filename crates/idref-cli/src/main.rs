//! # idref CLI entry point
//!
//! Parses command-line arguments, wires the handler registry from
//! configuration and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use idref_cli::grant::{run_grant, GrantArgs};
use idref_cli::resolve::{run_resolve, ResolveArgs};
use idref_cli::status::run_status;

/// Check and exercise the external services behind ID references.
#[derive(Parser, Debug)]
#[command(name = "idref", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML service configuration. Defaults to `IDREF_*` environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report the health of every configured service.
    Status,

    /// Resolve the ids extracted from a JSON document.
    Resolve(ResolveArgs),

    /// Grant read access to ids of one type.
    Grant(GrantArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let config = idref_cli::load_config(cli.config.as_deref())?;

    // Service clients block on the ambient runtime handle.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let _guard = runtime.enter();

    let registry = idref_handlers::factory_builder::<String>(&config, None)?;
    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Commands::Status => run_status(&registry, &mut stdout),
        Commands::Resolve(args) => run_resolve(args, &registry, &mut stdout),
        Commands::Grant(args) => run_grant(args, &registry, &mut stdout),
    }
}
