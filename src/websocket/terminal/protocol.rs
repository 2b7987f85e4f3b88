//! Terminal WebSocket control messages
//!
//! Shell output travels as binary frames; the only text frames the server
//! sends are these envelopes.

use serde::Serialize;

/// Control message to a terminal client
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session the connection records into
    SessionId(String),
    /// Fatal problem; the socket closes right after
    Error(String),
}

impl ServerMessage {
    /// JSON text of the envelope
    pub fn to_text(&self) -> String {
        // Both variants are a tag and a string, which always serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_envelope() {
        let text = ServerMessage::SessionId("abc123".to_string()).to_text();
        assert_eq!(text, r#"{"type":"session_id","data":"abc123"}"#);
    }

    #[test]
    fn test_error_envelope() {
        let text = ServerMessage::Error("isolated mode is not available".to_string()).to_text();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["data"], "isolated mode is not available");
    }
}
