//! Command history
//!
//! A small JSON-file store of commands typed in the browser terminal,
//! optionally scoped by execution mode.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default cap on stored commands
pub const DEFAULT_MAX_ITEMS: usize = 500;

/// One remembered command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    /// Command line as typed
    pub command: String,
    /// When it was saved
    pub timestamp: DateTime<Utc>,
    /// Execution mode it was typed in
    pub mode: String,
}

/// File-backed command history
pub struct CommandHistory {
    path: PathBuf,
    max_items: usize,
    entries: RwLock<Vec<CommandEntry>>,
}

/// Default history file (`~/.termcast/history.json`)
#[must_use]
pub fn default_history_path() -> PathBuf {
    termcast_replay::default_data_dir().join("history.json")
}

impl CommandHistory {
    /// Load the history at `path`, starting empty if the file is missing
    pub async fn open(path: impl AsRef<Path>, max_items: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::InvalidInput(format!("history file {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), "Command history loaded");
        Ok(Self {
            path,
            max_items: max_items.max(1),
            entries: RwLock::new(entries),
        })
    }

    /// Remember `command`; empty and repeated commands are skipped
    pub async fn add(&self, mode: &str, command: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if command.is_empty() || entries.last().is_some_and(|e| e.command == command) {
            return Ok(());
        }

        entries.push(CommandEntry {
            command: command.to_string(),
            timestamp: Utc::now(),
            mode: mode.to_string(),
        });
        if entries.len() > self.max_items {
            let excess = entries.len() - self.max_items;
            entries.drain(..excess);
        }
        self.persist(&entries).await
    }

    /// Stored commands, oldest first; an empty `mode` means all
    pub async fn list(&self, mode: &str) -> Vec<CommandEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| mode.is_empty() || e.mode == mode)
            .cloned()
            .collect()
    }

    /// Forget commands of `mode`, or everything when empty
    pub async fn clear(&self, mode: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if mode.is_empty() {
            entries.clear();
        } else {
            entries.retain(|e| e.mode != mode);
        }
        info!(mode = %mode, "Command history cleared");
        self.persist(&entries).await
    }

    async fn persist(&self, entries: &[CommandEntry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| Error::InvalidInput(format!("serialize history: {e}")))?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    async fn history(dir: &TempDir, max: usize) -> CommandHistory {
        CommandHistory::open(dir.path().join("history.json"), max)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_skips_empty_and_repeated() {
        let dir = TempDir::new().unwrap();
        let history = history(&dir, DEFAULT_MAX_ITEMS).await;

        for command in ["ls", "ls", "", "pwd", "ls"] {
            assert_ok!(history.add("local", command).await);
        }

        let commands: Vec<_> = history.list("").await.into_iter().map(|e| e.command).collect();
        assert_eq!(commands, ["ls", "pwd", "ls"]);
    }

    #[tokio::test]
    async fn test_cap_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let history = history(&dir, 3).await;
        for i in 0..5 {
            history.add("local", &format!("cmd{i}")).await.unwrap();
        }

        let commands: Vec<_> = history.list("").await.into_iter().map(|e| e.command).collect();
        assert_eq!(commands, ["cmd2", "cmd3", "cmd4"]);
    }

    #[tokio::test]
    async fn test_mode_filter_and_clear() {
        let dir = TempDir::new().unwrap();
        let history = history(&dir, DEFAULT_MAX_ITEMS).await;
        history.add("local", "ls").await.unwrap();
        history.add("isolated", "whoami").await.unwrap();

        assert_eq!(history.list("isolated").await.len(), 1);

        assert_ok!(history.clear("local").await);
        let remaining = history.list("").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mode, "isolated");

        assert_ok!(history.clear("").await);
        assert!(history.list("").await.is_empty());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        history(&dir, DEFAULT_MAX_ITEMS)
            .await
            .add("local", "make test")
            .await
            .unwrap();

        let reopened = history(&dir, DEFAULT_MAX_ITEMS).await;
        assert_eq!(reopened.list("local").await[0].command, "make test");
    }
}
