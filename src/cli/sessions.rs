//! Session inspection commands
//!
//! `termcast sessions list --user <u>` - table of a user's sessions
//! `termcast sessions show <id>`       - replay events as JSON
//! `termcast sweep`                    - close stale records

use super::SessionCommands;
use crate::server::{open_registry, AppConfig};
use anyhow::{Context, Result};
use termcast_replay::Session;

/// Run a sessions subcommand.
pub async fn run(command: SessionCommands, config: &AppConfig) -> Result<()> {
    let registry = open_registry(config).await?;
    let result = match command {
        SessionCommands::List { user } => {
            let sessions = registry.list(&user).await.context("Failed to list sessions")?;
            if sessions.is_empty() {
                println!("No sessions for {user}");
            } else {
                print!("{}", format_table(&sessions));
            }
            Ok(())
        }
        SessionCommands::Show { id } => {
            registry
                .get(&id)
                .await
                .with_context(|| format!("Session {id} not found"))?;
            let events = registry.session_data(&id).await.context("Failed to load events")?;
            println!("{}", serde_json::to_string_pretty(&events)?);
            Ok(())
        }
    };
    registry.recorder().shutdown().await;
    result
}

/// Close records left open by a previous run.
pub async fn sweep(config: &AppConfig) -> Result<()> {
    let registry = open_registry(config).await?;
    let report = registry
        .sweep_stale()
        .await
        .context("Failed to close stale sessions")?;
    println!("Closed {} stale sessions", report.closed);
    registry.recorder().shutdown().await;
    Ok(())
}

fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

fn format_table(sessions: &[Session]) -> String {
    let mut out = format!(
        "{:<32}  {:<24}  {:<8}  {:<19}  {:>9}  {}\n",
        "ID", "NAME", "MODE", "CREATED", "DURATION", "STATE"
    );
    for s in sessions {
        let state = match (s.is_live, s.ended_at.is_some()) {
            (true, _) => "live",
            (false, true) => "ended",
            (false, false) => "open",
        };
        let name: String = s.name.chars().take(24).collect();
        out.push_str(&format!(
            "{:<32}  {:<24}  {:<8}  {:<19}  {:>9}  {}\n",
            s.id,
            name,
            s.mode.as_str(),
            s.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            format_duration(s.duration_ms),
            state
        ));
    }
    out
}
