//! Fleet hardware inventory CLI
//!
//! Usage:
//!   fleet scan --targets terminals.csv   # collect and persist
//!   fleet init                           # write an example config
//!   fleet config                         # show the effective config

mod cli;
mod commands;
mod core;

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use core::ScanConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { output, force } => commands::init_config(output, force),
        Commands::Scan(args) => {
            let config = load_config(cli.config.as_deref())?;
            args.execute(config, cli.format).await
        }
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            commands::show_config(&config, cli.format)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::load_from(path),
        None => ScanConfig::load(),
    }
}
