//! Terminal WebSocket module
//!
//! `/ws/terminal?mode=&session_id=&container=` bridges one socket to one
//! shell and records everything into the session.

pub mod protocol;
pub mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use termcast_core::{BridgeRequest, GUEST_USER};
use tracing::debug;

use crate::middleware::identity::MaybeIdentity;
use crate::server::AppState;

/// Query string of a terminal connection
#[derive(Debug, Default, Deserialize)]
pub struct TerminalQuery {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
}

impl TerminalQuery {
    /// Bridge request; an unknown mode falls back to local
    pub fn into_request(self) -> BridgeRequest {
        let mode = self.mode.as_deref().filter(|m| !m.is_empty()).and_then(|m| {
            m.parse()
                .map_err(|e: String| debug!("Ignoring mode: {}", e))
                .ok()
        });
        BridgeRequest {
            mode,
            session_id: self.session_id.filter(|s| !s.is_empty()),
            container: self.container.filter(|c| !c.is_empty()),
        }
    }
}

/// WebSocket upgrade handler; anonymous callers run as the guest user
pub async fn terminal_handler(
    MaybeIdentity(username): MaybeIdentity,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<TerminalQuery>,
) -> impl IntoResponse {
    let username = username.unwrap_or_else(|| GUEST_USER.to_string());
    let request = query.into_request();
    ws.on_upgrade(move |socket| session::handle_socket(socket, state, username, request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcast_replay::SessionMode;

    #[test]
    fn test_query_to_request() {
        let request = TerminalQuery {
            mode: Some("docker".to_string()),
            session_id: Some("abc".to_string()),
            container: Some(String::new()),
        }
        .into_request();
        assert_eq!(request.mode, Some(SessionMode::Isolated));
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert!(request.container.is_none());
    }

    #[test]
    fn test_unknown_mode_is_dropped() {
        let request = TerminalQuery {
            mode: Some("vm".to_string()),
            ..TerminalQuery::default()
        }
        .into_request();
        assert!(request.mode.is_none());
        assert!(request.session_id.is_none());
    }
}
