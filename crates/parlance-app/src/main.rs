#![forbid(unsafe_code)]

//! Binary entrypoint wiring the Parlance services together.

pub mod adapters;
pub mod bootstrap;
pub mod error;
pub mod purge;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parlance", about = "Clustered audio language-identification service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service and worker pool (the default).
    Serve,
    /// Purge old terminal jobs and orphaned storage artifacts.
    Purge(purge::PurgeArgs),
}

/// Bootstraps the service and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => bootstrap::run_app().await?,
        Command::Purge(args) => purge::run(&args).await?,
    }
    Ok(())
}
