//! Error types for termcast-replay

use thiserror::Error;

/// Replay error type
#[derive(Debug, Error)]
pub enum Error {
    /// Session or event not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Rejected input (unknown mode, malformed value)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The event writer has stopped accepting work
    #[error("event writer queue closed")]
    QueueClosed,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
