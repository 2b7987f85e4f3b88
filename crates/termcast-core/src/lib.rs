//! Termcast Core - Terminal Session Engine
//!
//! This crate provides the runtime pieces behind Termcast:
//! - Registry: session records and the active-handle table
//! - Bridge: PTY processes wired to client connections
//! - Live: rooms, permission modes and output fan-out
//! - Runtime: container capability for isolated sessions
//! - Identity: cookie-token login over configured accounts
//! - History: remembered commands
//! - Shutdown: graceful shutdown coordination

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bridge;
pub mod error;
pub mod history;
pub mod identity;
pub mod ids;
pub mod live;
pub mod pty;
pub mod registry;
pub mod runtime;
pub mod shutdown;

pub use bridge::{
    classify_text, resolve_container, BridgeRequest, BridgeSession, InboundText, ResolvedSession,
    SessionCleanup, TerminalBridge, TerminalConfig,
};
pub use error::{Error, Result};
pub use history::{CommandEntry, CommandHistory};
pub use identity::{CookieIdentity, Identity, UserAccount, GUEST_USER, SESSION_COOKIE};
pub use live::{ClientMessage, LiveConfig, LiveConnection, LiveHub, LiveMessage, MessageKind, ViewerInfo};
pub use pty::{PtyProcess, ShellCommand, TermSize};
pub use registry::{ActiveSessionHandle, Attachment, SessionRegistry};
pub use runtime::{ContainerRuntime, DockerRuntime};
pub use shutdown::{ConnectionGuard, ShutdownController};
