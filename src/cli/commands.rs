//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy Load CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-load")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the queue capacity derived from the memory budget
    Capacity,

    /// Validate the configuration and print it with defaults filled in
    Validate,

    /// Run a synthetic sync and print the enriched checkpoints
    Simulate {
        /// Number of streams
        #[arg(long, default_value = "2")]
        streams: usize,

        /// Records per stream
        #[arg(long, default_value = "1000")]
        records: u64,

        /// Records between checkpoints
        #[arg(long, default_value = "100")]
        checkpoint_every: u64,

        /// Mark every Nth record as having a nulled value (0 = never)
        #[arg(long, default_value = "10")]
        nulled_every: u64,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
