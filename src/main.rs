// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unused_async)]

//! Solidafy Load CLI
//!
//! Command-line interface for sizing and exercising the load pipeline

use clap::Parser;
use solidafy_load::cli::{Cli, Runner};
use solidafy_load::PipelineConfig;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The configured level applies unless RUST_LOG overrides it
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        cli.config
            .as_ref()
            .and_then(|path| PipelineConfig::from_file(path).ok())
            .map_or(tracing::Level::INFO, |config| config.logging.level.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(level).into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::new(cli);

    if let Err(e) = runner.run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
