//! CLI module
//!
//! Command-line interface for sizing and exercising the load pipeline.
//!
//! # Commands
//!
//! - `capacity` - Show queue sizing for the configured memory budget
//! - `validate` - Validate a config file and print it with defaults
//! - `simulate` - Run a synthetic sync and print enriched checkpoints

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
