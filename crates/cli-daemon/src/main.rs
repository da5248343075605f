//! CLI entry point for the encoda daemon.
//!
//! Parses command line arguments, loads the configuration, and runs the
//! daemon until interrupted.

use clap::Parser;
use encoda_daemon::{Config, Server};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Encoda - automated media transcoding daemon
#[derive(Parser, Debug)]
#[command(name = "encoda-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(config = %args.config.display(), "encoda daemon starting");

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.directories.is_empty() {
        tracing::warn!("no search directories configured; nothing will be discovered");
    }

    match Server::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Daemon error: {}", e);
            ExitCode::FAILURE
        }
    }
}
