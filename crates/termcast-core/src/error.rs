//! Error types for termcast-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Session, room or member not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller does not own the resource
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Operation conflicts with current state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rejected input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Pseudo-terminal allocation or I/O failure
    #[error("pty error: {0}")]
    Pty(String),

    /// Container runtime failure
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// The live hub is no longer running
    #[error("live hub stopped")]
    HubStopped,

    /// Storage error
    #[error(transparent)]
    Storage(#[from] termcast_replay::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means "does not exist"
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Storage(termcast_replay::Error::NotFound(_))
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
