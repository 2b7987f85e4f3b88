//! Live wire messages
//!
//! Server-to-client envelopes are serialized once per fan-out and shared
//! between member queues as [`Frame`]s. Client-to-server messages are
//! decoded once into [`ClientMessage`] at the socket boundary.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use termcast_replay::PermissionMode;

/// A serialized envelope queued for one or more members
pub type Frame = Arc<str>;

/// Envelope discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Terminal output
    Output,
    /// Viewer keystrokes forwarded to the owner
    Input,
    /// Someone joined the room
    ViewerJoin,
    /// Someone left the room
    ViewerLeave,
    /// A viewer asks the owner for write access
    PermissionRequest,
    /// Write access granted
    PermissionGrant,
    /// Write access revoked
    PermissionDeny,
    /// Room permission mode changed
    PermissionModeChange,
    /// Chat line
    Chat,
}

/// Server-to-client envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Discriminant
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Session the room belongs to
    pub session_id: String,
    /// Payload
    pub data: Value,
    /// Originating member, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl LiveMessage {
    /// Envelope stamped with the current time
    pub fn new(kind: MessageKind, session_id: &str, data: Value) -> Self {
        Self {
            kind,
            session_id: session_id.to_string(),
            data,
            sender: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Set the sender
    #[must_use]
    pub fn from_sender(mut self, sender: &str) -> Self {
        self.sender = Some(sender.to_string());
        self
    }

    pub(crate) fn output(session_id: &str, bytes: &[u8]) -> Self {
        Self::new(
            MessageKind::Output,
            session_id,
            Value::String(String::from_utf8_lossy(bytes).into_owned()),
        )
    }

    pub(crate) fn membership(kind: MessageKind, session_id: &str, username: &str, count: usize) -> Self {
        Self::new(kind, session_id, json!({ "username": username, "count": count }))
    }

    pub(crate) fn permission(kind: MessageKind, session_id: &str, username: &str) -> Self {
        Self::new(kind, session_id, json!({ "username": username }))
    }

    pub(crate) fn mode_change(session_id: &str, mode: PermissionMode) -> Self {
        Self::new(
            MessageKind::PermissionModeChange,
            session_id,
            json!({ "mode": mode }),
        )
    }

    /// Serialize into a shareable frame
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        // Only string keys and JSON values; serialization cannot fail
        serde_json::to_string(self)
            .unwrap_or_else(|_| String::from("{}"))
            .into()
    }

    /// Parse a frame back (used by tests and tools)
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// `{"username": ...}` payload of grant and deny requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameData {
    /// Target member
    pub username: String,
}

/// Client-to-server message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keystrokes for the owner's terminal
    Input {
        /// Opaque payload relayed to the owner
        #[serde(default)]
        data: Value,
    },
    /// Ask the owner for write access
    PermissionRequest,
    /// Owner grants write access
    PermissionGrant {
        /// Target
        data: UsernameData,
    },
    /// Owner revokes write access
    PermissionDeny {
        /// Target
        data: UsernameData,
    },
    /// Chat line for the whole room
    Chat {
        /// Opaque payload
        #[serde(default)]
        data: Value,
    },
}

impl ClientMessage {
    /// Decode a text frame; `None` for malformed or unknown messages
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
