//! CLI module for Termcast
//!
//! Provides commands:
//! - `serve`: Run the server (default)
//! - `sessions`: Inspect recorded sessions
//! - `sweep`: Close sessions a previous run left open

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::server::AppConfig;

pub mod sessions;

/// Termcast terminal server CLI
#[derive(Parser, Debug)]
#[command(name = "termcast")]
#[command(about = "Browser terminals with recording and live sharing")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve {
        /// Listen address
        #[arg(long)]
        host: Option<String>,
        /// Listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Inspect recorded sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
    /// Close sessions left open by a previous run and exit
    Sweep,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List the sessions of a user
    List {
        /// Owner to list
        #[arg(long, default_value = termcast_core::GUEST_USER)]
        user: String,
    },
    /// Print the replay events of a session as JSON
    Show {
        /// Session ID
        id: String,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli, mut config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        None => crate::server::run(config).await,
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            crate::server::run(config).await
        }
        Some(Commands::Sessions(command)) => sessions::run(command, &config).await,
        Some(Commands::Sweep) => sessions::sweep(&config).await,
    }
}
