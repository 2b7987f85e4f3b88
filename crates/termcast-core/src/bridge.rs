//! PTY bridge
//!
//! Everything a terminal connection needs apart from the socket itself:
//! resolving which session it records into, choosing and authorizing the
//! execution target, spawning the shell, mirroring traffic into the event
//! log and the live room, and a once-only cleanup.

use crate::error::{Error, Result};
use crate::live::LiveHub;
use crate::pty::{PtyProcess, PtyReader, PtyWriter, ShellCommand, TermSize};
use crate::registry::{Attachment, SessionRegistry};
use crate::runtime::{legacy_container_name, user_prefix, ContainerRuntime};
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use termcast_replay::{EventType, Session, SessionMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shell and PTY settings for local sessions
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Login shell
    pub shell: String,
    /// Shell arguments
    pub shell_args: Vec<String>,
    /// Initial geometry
    pub size: TermSize,
    /// Largest chunk read from the PTY at once
    pub read_buffer_size: usize,
    /// Time a hung-up child gets before it is killed
    pub kill_grace: Duration,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            shell_args: vec!["--login".to_string()],
            size: TermSize::default(),
            read_buffer_size: 32 * 1024,
            kill_grace: Duration::from_millis(500),
        }
    }
}

/// What a terminal client asked for
#[derive(Debug, Clone, Default)]
pub struct BridgeRequest {
    /// Execution mode for a new session
    pub mode: Option<SessionMode>,
    /// Session to resume
    pub session_id: Option<String>,
    /// Specific container to exec into
    pub container: Option<String>,
}

/// Session a connection records into
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    /// The record
    pub session: Session,
    /// Whether an existing session was resumed
    pub resumed: bool,
    /// Registry claim held for this connection
    pub claim: u64,
}

impl ResolvedSession {
    fn new(attachment: Attachment, resumed: bool) -> Self {
        Self {
            session: attachment.session,
            resumed,
            claim: attachment.claim,
        }
    }
}

/// Decoded text frame from a terminal client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundText {
    /// Resize request; `None` when the geometry is unusable
    Resize(Option<TermSize>),
    /// Anything else is keyboard input
    Input,
}

#[derive(Deserialize)]
struct ControlEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Classify a text frame as a resize control message or input
#[must_use]
pub fn classify_text(text: &str) -> InboundText {
    match serde_json::from_str::<ControlEnvelope>(text) {
        Ok(envelope) if envelope.kind == "resize" => {
            let dim = |key: &str| envelope.data.get(key).and_then(Value::as_i64).unwrap_or(0);
            InboundText::Resize(TermSize::from_request(dim("cols"), dim("rows")))
        }
        _ => InboundText::Input,
    }
}

/// Name given to sessions opened by a bare terminal connection
#[must_use]
pub fn auto_session_name() -> String {
    format!("Terminal {}", Local::now().format("%H:%M:%S"))
}

/// Container a connection may exec into
///
/// A requested handle is honored only inside the caller's namespace or when
/// it is the session's own handle; otherwise the default is used.
#[must_use]
pub fn resolve_container(username: &str, session: &Session, requested: Option<&str>) -> String {
    let default = session
        .container_name
        .clone()
        .unwrap_or_else(|| legacy_container_name(username));

    match requested.filter(|r| !r.is_empty()) {
        Some(requested) if requested.starts_with(&user_prefix(username)) || requested == default => {
            requested.to_string()
        }
        Some(requested) => {
            warn!(username = %username, container = %requested, "Refused container outside user namespace");
            default
        }
        None => default,
    }
}

/// Holds back a trailing incomplete UTF-8 sequence between output chunks
///
/// Recording and live fan-out decode each chunk on its own; a character
/// split across two PTY reads would otherwise turn into replacement marks.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Bytes ready to emit: earlier leftovers plus `chunk`, minus a new
    /// incomplete tail
    fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);
        let keep = incomplete_tail(&bytes);
        self.pending = bytes.split_off(bytes.len() - keep);
        bytes
    }

    /// Whatever is still held back
    fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

/// Length of an unfinished multi-byte sequence at the end of `bytes`
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        let width = match byte {
            0x80..=0xBF => continue,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return 0,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Builds terminal sessions for connections
pub struct TerminalBridge {
    registry: Arc<SessionRegistry>,
    hub: Arc<LiveHub>,
    runtime: Arc<dyn ContainerRuntime>,
    config: TerminalConfig,
}

impl TerminalBridge {
    /// Create a bridge over shared services
    pub fn new(
        registry: Arc<SessionRegistry>,
        hub: Arc<LiveHub>,
        runtime: Arc<dyn ContainerRuntime>,
        config: TerminalConfig,
    ) -> Self {
        Self {
            registry,
            hub,
            runtime,
            config,
        }
    }

    /// Container runtime in use
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Terminal settings
    #[must_use]
    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    /// Resume the requested session or create a new one
    ///
    /// Resuming needs an existing session owned by `username` that no other
    /// connection holds; anything else silently creates a fresh session.
    pub async fn resolve(&self, username: &str, request: &BridgeRequest) -> Result<ResolvedSession> {
        if let Some(id) = request.session_id.as_deref().filter(|id| !id.is_empty()) {
            match self.registry.get(id).await {
                Ok(session) if session.user == username => match self.registry.attach(id).await {
                    Ok(attachment) => {
                        info!(session_id = %id, username = %username, "Resuming session");
                        return Ok(ResolvedSession::new(attachment, true));
                    }
                    Err(Error::Conflict(_)) => {
                        debug!(session_id = %id, "Session already attached, creating a new one");
                    }
                    Err(e) => return Err(e),
                },
                Ok(_) => debug!(session_id = %id, username = %username, "Resume refused for non-owner"),
                Err(e) if e.is_not_found() => debug!(session_id = %id, "Unknown session, creating a new one"),
                Err(e) => return Err(e),
            }
        }

        let mode = request.mode.unwrap_or(SessionMode::Local);
        let session = self
            .registry
            .create(username, &auto_session_name(), mode)
            .await?;
        let attachment = self.registry.attach(&session.id).await?;
        Ok(ResolvedSession::new(attachment, false))
    }

    /// Command that runs the shell for `resolved`, preparing its container
    pub async fn shell_command(
        &self,
        username: &str,
        resolved: &ResolvedSession,
        request: &BridgeRequest,
    ) -> Result<ShellCommand> {
        let session = &resolved.session;
        if session.mode == SessionMode::Local {
            return Ok(ShellCommand::new(&self.config.shell)
                .args(self.config.shell_args.iter().cloned())
                .with_base_env());
        }

        if !self.runtime.is_ready() {
            return Err(Error::Runtime("isolated mode is not available".to_string()));
        }

        let container = resolve_container(username, session, request.container.as_deref());
        if session.container_name.as_deref() != Some(container.as_str()) {
            self.registry.set_container_name(&session.id, &container).await?;
        }
        self.runtime.ensure_environment(&container).await?;
        Ok(self.runtime.exec_command(&container, resolved.resumed))
    }

    /// Start the shell for a resolved session
    ///
    /// On failure the session is released so it can be resumed later.
    pub async fn spawn(
        &self,
        username: &str,
        resolved: ResolvedSession,
        request: &BridgeRequest,
    ) -> Result<BridgeSession> {
        let session_id = resolved.session.id.clone();
        let started = match self.shell_command(username, &resolved, request).await {
            Ok(command) => PtyProcess::spawn(&command, self.config.size),
            Err(e) => Err(e),
        };

        let (process, reader, writer) = match started {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(end_err) = self.registry.release(&session_id, resolved.claim).await {
                    warn!(session_id = %session_id, "Failed to release session: {}", end_err);
                }
                return Err(e);
            }
        };

        info!(
            session_id = %session_id,
            mode = %resolved.session.mode,
            pid = ?process.pid(),
            resumed = resolved.resumed,
            "Terminal started"
        );

        let process = Arc::new(process);
        let cleanup = Arc::new(SessionCleanup::new(
            session_id,
            resolved.claim,
            self.registry.clone(),
            process.clone(),
            self.config.kill_grace,
        ));
        Ok(BridgeSession {
            session: resolved.session,
            resumed: resolved.resumed,
            process,
            reader,
            writer,
            cleanup,
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            read_buffer_size: self.config.read_buffer_size,
            carry: Mutex::new(Utf8Carry::default()),
        })
    }
}

/// A running shell bound to one session
pub struct BridgeSession {
    /// Session being recorded
    pub session: Session,
    /// Whether it was resumed
    pub resumed: bool,
    process: Arc<PtyProcess>,
    reader: PtyReader,
    writer: PtyWriter,
    cleanup: Arc<SessionCleanup>,
    registry: Arc<SessionRegistry>,
    hub: Arc<LiveHub>,
    read_buffer_size: usize,
    carry: Mutex<Utf8Carry>,
}

impl BridgeSession {
    /// Next chunk of shell output; `None` once the PTY is closed
    ///
    /// Chunks end on UTF-8 character boundaries; an unfinished sequence is
    /// completed by the next read or emitted as is at the end.
    pub async fn read_output(&self) -> Option<Vec<u8>> {
        loop {
            let read = self.reader.read_chunk(self.read_buffer_size).await;
            let mut carry = self.carry.lock().unwrap_or_else(PoisonError::into_inner);
            let (chunk, open) = match read {
                Ok(Some(chunk)) => (carry.push(&chunk), true),
                Ok(None) => (carry.finish(), false),
                Err(e) => {
                    debug!(session_id = %self.session.id, "PTY read ended: {}", e);
                    (carry.finish(), false)
                }
            };
            if !chunk.is_empty() {
                return Some(chunk);
            }
            if !open {
                return None;
            }
        }
    }

    /// Record an output chunk and fan it out to the live room
    pub async fn record_output(&self, chunk: &[u8]) {
        self.registry
            .add_event(&self.session.id, EventType::Output, chunk)
            .await;
        self.hub.broadcast_output(&self.session.id, chunk);
    }

    /// Write client input to the shell and record it
    pub async fn write_input(&self, bytes: Vec<u8>) -> Result<()> {
        self.registry
            .add_event(&self.session.id, EventType::Input, &bytes)
            .await;
        self.writer.write(bytes).await
    }

    /// Apply a resize request and record the raw control message
    pub async fn resize(&self, size: TermSize, raw: &str) -> Result<()> {
        self.process.resize(size)?;
        self.registry
            .add_event(&self.session.id, EventType::Resize, raw.as_bytes())
            .await;
        Ok(())
    }

    /// Resolve once the shell exits
    pub async fn wait_exit(&self) {
        self.process.wait_exit().await;
    }

    /// Token cancelled when cleanup starts
    #[must_use]
    pub fn closed(&self) -> CancellationToken {
        self.cleanup.closed.clone()
    }

    /// Shared cleanup handle
    #[must_use]
    pub fn cleanup(&self) -> Arc<SessionCleanup> {
        self.cleanup.clone()
    }
}

/// Once-only teardown of a bridge
pub struct SessionCleanup {
    session_id: String,
    claim: u64,
    registry: Arc<SessionRegistry>,
    process: Arc<PtyProcess>,
    grace: Duration,
    started: AtomicBool,
    closed: CancellationToken,
}

impl SessionCleanup {
    fn new(
        session_id: String,
        claim: u64,
        registry: Arc<SessionRegistry>,
        process: Arc<PtyProcess>,
        grace: Duration,
    ) -> Self {
        Self {
            session_id,
            claim,
            registry,
            process,
            grace,
            started: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    /// Close the PTY, stop the shell and end the session
    ///
    /// Only the first call does anything; it returns `true`.
    pub async fn run(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.closed.cancel();

        self.process.close();
        if let Err(e) = self.process.terminate(self.grace).await {
            warn!(session_id = %self.session_id, "Failed to stop shell: {}", e);
        }

        match self.registry.release(&self.session_id, self.claim).await {
            Ok(()) => {}
            // Shutdown ended it first
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(session_id = %self.session_id, "Failed to end session: {}", e),
        }
        info!(session_id = %self.session_id, "Terminal closed");
        true
    }

    /// Whether cleanup has started
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}
