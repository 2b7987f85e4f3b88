//! Termcast - Browser Terminals
//!
//! CLI entry point for the Termcast server.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;

mod api;
mod cli;
mod logging;
mod middleware;
mod server;
mod websocket;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = server::load_config(cli.config.as_deref())?;

    let _log_guard = logging::init(
        cli.json_logs || config.logging.json,
        config.logging.directory.as_deref(),
    );

    cli::run(cli, config).await
}
