//! Tresor - control-plane credential backup
//!
//! Entry point for the `tresor` binary.

mod cli;
mod commands;
mod controller;
mod leader;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Version(args) => commands::version::run(args),
        Commands::Policy(args) => commands::policy::run(args),
        Commands::Backup(args) => commands::backup::run(args, cli.config.as_deref()).await,
        Commands::Run(args) => commands::run::run(args, cli.config.as_deref()).await,
    }
}

/// Initialize tracing; `RUST_LOG` wins over the verbosity flags when set
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("info"),
                1 => EnvFilter::new("debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
