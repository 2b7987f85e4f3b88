//! Container runtime capability
//!
//! Isolated sessions run their shell inside a per-session container. The
//! bridge only needs three things from the runtime: whether it can be used at
//! all, a way to make sure a container exists and runs, and the command that
//! opens a shell inside it.

use crate::error::{Error, Result};
use crate::pty::ShellCommand;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Prefix shared by every container this service manages
pub const CONTAINER_PREFIX: &str = "tc_";

const PROMPT: &str =
    r"\[\e[32m\]termcast\[\e[0m\]@\[\e[31m\]root\[\e[0m\]:\[\e[36m\]\w\[\e[0m\]$ ";

/// Lowercase `username`, replacing anything outside `[a-z0-9_-]` with `_`
#[must_use]
pub fn sanitize_username(username: &str) -> String {
    let sanitized: String = username
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    if sanitized.is_empty() {
        "user".to_string()
    } else {
        sanitized
    }
}

/// Namespace every container of `owner` starts with
#[must_use]
pub fn user_prefix(owner: &str) -> String {
    format!("{CONTAINER_PREFIX}{}_", sanitize_username(owner))
}

/// Container handle of one isolated session
#[must_use]
pub fn session_container_name(owner: &str, session_id: &str) -> String {
    format!("{}sess_{session_id}", user_prefix(owner))
}

/// Per-user container used before sessions had their own
#[must_use]
pub fn legacy_container_name(owner: &str) -> String {
    format!("{}terminal", user_prefix(owner))
}

/// Something that can host isolated shells
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether isolated sessions can be served
    fn is_ready(&self) -> bool;

    /// Make sure the container named `handle` exists and runs
    async fn ensure_environment(&self, handle: &str) -> Result<()>;

    /// Command opening a login shell inside `handle`
    fn exec_command(&self, handle: &str, resuming: bool) -> ShellCommand;
}

/// Docker CLI backed runtime
pub struct DockerRuntime {
    binary: String,
    image: String,
    hostname: String,
    ready: AtomicBool,
}

impl DockerRuntime {
    /// Create a runtime; not ready until [`detect`](Self::detect) succeeds
    pub fn new(
        binary: impl Into<String>,
        image: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            image: image.into(),
            hostname: hostname.into(),
            ready: AtomicBool::new(false),
        }
    }

    /// Image containers are created from
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Check that the docker daemon answers and the image is present
    pub async fn detect(&self) -> bool {
        let ready = self.succeeds(&["version"]).await
            && self.succeeds(&["image", "inspect", &self.image]).await;
        self.ready.store(ready, Ordering::SeqCst);

        if ready {
            info!(image = %self.image, "Container runtime ready");
        } else {
            warn!(image = %self.image, "Container runtime unavailable, isolated mode disabled");
        }
        ready
    }

    async fn succeeds(&self, args: &[&str]) -> bool {
        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn output(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Runtime(format!("{} {}: {e}", self.binary, args.join(" "))))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Runtime(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_args(&self, handle: &str) -> Vec<String> {
        let mut args: Vec<String> = ["run", "-d", "--name", handle, "--hostname", self.hostname.as_str()]
            .iter()
            .map(ToString::to_string)
            .collect();
        for (key, value) in crate::pty::BASE_ENV {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.extend(
            [self.image.as_str(), "tail", "-f", "/dev/null"]
                .iter()
                .map(ToString::to_string),
        );
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn ensure_environment(&self, handle: &str) -> Result<()> {
        let filter = format!("name=^{handle}$");

        if !self.output(&["ps", "-q", "-f", &filter]).await?.is_empty() {
            debug!(container = %handle, "Container already running");
            return Ok(());
        }

        if !self.output(&["ps", "-aq", "-f", &filter]).await?.is_empty() {
            info!(container = %handle, "Starting stopped container");
            self.output(&["start", handle]).await?;
            return Ok(());
        }

        info!(container = %handle, image = %self.image, "Creating container");
        let args = self.run_args(handle);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.output(&args).await?;
        Ok(())
    }

    fn exec_command(&self, handle: &str, resuming: bool) -> ShellCommand {
        let mut cmd = ShellCommand::new(&self.binary).args([
            "exec",
            "-it",
            "-e",
            "TERM=xterm-256color",
            "-e",
            "COLORTERM=truecolor",
        ]);
        cmd = cmd.arg("-e").arg(format!("PS1={PROMPT}"));
        if resuming {
            cmd = cmd.args(["-e", "TERMCAST_SKIP_BANNER=1"]);
        }
        cmd.args(["-w", "/root", handle, "/bin/bash", "--login"])
            .with_base_env()
    }
}
