//! Server configuration types
//!
//! Contains all configuration structures for the Termcast server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use termcast_core::{LiveConfig, TermSize, TerminalConfig, UserAccount};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub terminal: TerminalSettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for non-API paths
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Seconds connections get to clean up on shutdown
    #[serde(default = "default_drain_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3333
}
fn default_drain_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
            shutdown_timeout_secs: default_drain_secs(),
        }
    }
}

/// Session database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `~/.termcast/sessions.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_write_queue")]
    pub write_queue_capacity: usize,
}

fn default_write_queue() -> usize {
    4096
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            write_queue_capacity: default_write_queue(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(termcast_replay::default_db_path)
    }
}

/// Local shell and PTY
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSettings {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_read_buffer")]
    pub read_buffer_size: usize,
    #[serde(default = "default_kill_grace")]
    pub kill_grace_ms: u64,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}
fn default_shell_args() -> Vec<String> {
    vec!["--login".to_string()]
}
fn default_cols() -> u16 {
    120
}
fn default_rows() -> u16 {
    30
}
fn default_read_buffer() -> usize {
    32 * 1024
}
fn default_kill_grace() -> u64 {
    500
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            shell_args: default_shell_args(),
            cols: default_cols(),
            rows: default_rows(),
            read_buffer_size: default_read_buffer(),
            kill_grace_ms: default_kill_grace(),
        }
    }
}

impl TerminalSettings {
    pub fn to_terminal_config(&self) -> TerminalConfig {
        TerminalConfig {
            shell: self.shell.clone(),
            shell_args: self.shell_args.clone(),
            size: TermSize {
                cols: self.cols.max(1),
                rows: self.rows.max(1),
            },
            read_buffer_size: self.read_buffer_size.max(1024),
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}

/// Live hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSettings {
    #[serde(default = "default_replay_bytes")]
    pub replay_buffer_bytes: usize,
    #[serde(default = "default_viewer_queue")]
    pub viewer_queue_capacity: usize,
    #[serde(default = "default_ping_secs")]
    pub ping_interval_secs: u64,
}

fn default_replay_bytes() -> usize {
    50_000
}
fn default_viewer_queue() -> usize {
    2048
}
fn default_ping_secs() -> u64 {
    30
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            replay_buffer_bytes: default_replay_bytes(),
            viewer_queue_capacity: default_viewer_queue(),
            ping_interval_secs: default_ping_secs(),
        }
    }
}

impl LiveSettings {
    pub fn to_live_config(&self) -> LiveConfig {
        LiveConfig {
            replay_buffer_bytes: self.replay_buffer_bytes,
            viewer_queue_capacity: self.viewer_queue_capacity,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

/// Container runtime for isolated sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_docker")]
    pub docker_binary: String,
}

fn default_true() -> bool {
    true
}
fn default_image() -> String {
    "termcast-terminal".to_string()
}
fn default_hostname() -> String {
    "termcast".to_string()
}
fn default_docker() -> String {
    "docker".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image: default_image(),
            hostname: default_hostname(),
            docker_binary: default_docker(),
        }
    }
}

/// Login accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<UserAccount>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: u64,
}

fn default_token_ttl() -> u64 {
    168
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            token_ttl_hours: default_token_ttl(),
        }
    }
}

/// Command history file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Defaults to `~/.termcast/history.json`
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_history_items")]
    pub max_items: usize,
}

fn default_history_items() -> usize {
    termcast_core::history::DEFAULT_MAX_ITEMS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_items: default_history_items(),
        }
    }
}

impl HistoryConfig {
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(termcast_core::history::default_history_path)
    }
}

/// Log output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write daily log files here
    #[serde(default)]
    pub directory: Option<PathBuf>,
}
