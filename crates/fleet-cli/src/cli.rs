//! Fleet CLI structure

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::ScanArgs;

/// Fleet - hardware inventory scanner for Linux terminal fleets
///
/// Connects to every terminal in a target list over SSH, fingerprints its
/// hardware, and reconciles the results into a database or a CSV report.
#[derive(Parser)]
#[command(name = "fleet")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect hardware from every target and persist the results
    Scan(ScanArgs),

    /// Write an example configuration file
    Init {
        /// Destination (defaults to the user config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Config,
}
