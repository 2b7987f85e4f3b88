//! Event types and schemas
//!
//! Every byte that crosses the PTY boundary is recorded as an event, along
//! with accepted resize requests. Events are append-only.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Event types for the terminal log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Bytes read from the PTY
    Output,
    /// Bytes written to the PTY
    Input,
    /// Geometry change applied to the PTY
    Resize,
}

impl EventType {
    /// Returns the string representation of the event type
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Input => "input",
            Self::Resize => "resize",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "output" => Ok(Self::Output),
            "input" => Ok(Self::Input),
            "resize" => Ok(Self::Resize),
            _ => Err(format!("unknown event type: {s}")),
        }
    }
}

/// An event waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Owning session
    pub session_id: String,
    /// Discriminant
    pub event_type: EventType,
    /// Raw payload
    pub data: Vec<u8>,
    /// Wall-clock time in milliseconds since the epoch
    pub timestamp: i64,
}

impl NewEvent {
    /// Create an event stamped with the current time
    #[must_use]
    pub fn new(session_id: impl Into<String>, event_type: EventType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            session_id: session_id.into(),
            event_type,
            data: data.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Override the timestamp
    #[must_use]
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Insertion sequence, breaks timestamp ties
    pub id: i64,
    /// Owning session
    pub session_id: String,
    /// Discriminant
    pub event_type: EventType,
    /// Raw payload
    pub data: Vec<u8>,
    /// Wall-clock time in milliseconds since the epoch
    pub timestamp: i64,
}

/// An event as handed to replay clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEvent {
    /// Discriminant
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Payload decoded as UTF-8 (lossy)
    pub data: String,
    /// Milliseconds since the first recorded event
    pub timestamp: i64,
}

/// Convert stored events (already in store order) into replay form.
///
/// Offsets are taken from the earliest timestamp and clamped at zero, so a
/// clock that stepped backwards never yields a negative offset. The running
/// maximum keeps offsets non-decreasing in the given order.
#[must_use]
pub fn to_replay(events: &[SessionEvent]) -> Vec<ReplayEvent> {
    let Some(base) = events.iter().map(|e| e.timestamp).min() else {
        return Vec::new();
    };

    let mut last = 0;
    events
        .iter()
        .map(|event| {
            let offset = (event.timestamp - base).max(last);
            last = offset;
            ReplayEvent {
                event_type: event.event_type,
                data: String::from_utf8_lossy(&event.data).into_owned(),
                timestamp: offset,
            }
        })
        .collect()
}
