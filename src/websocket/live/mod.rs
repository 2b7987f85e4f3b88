//! Live viewing WebSocket module
//!
//! `/ws/live?token=` joins the room of a shared session. The owner connects
//! here too and relays forwarded input into their own terminal.

pub mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use termcast_core::ids;
use termcast_replay::Session;

use crate::api::ApiError;
use crate::middleware::identity::MaybeIdentity;
use crate::server::AppState;

/// Query string of a live connection
#[derive(Debug, Default, Deserialize)]
pub struct LiveQuery {
    #[serde(default)]
    pub token: String,
}

/// Display name for an anonymous viewer
pub fn guest_name() -> String {
    format!("guest_{}", ids::random_hex(3))
}

/// Session behind a share token: 400 empty, 404 unknown, 410 not live
pub async fn shared_session(state: &AppState, token: &str) -> Result<Session, ApiError> {
    if token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    let session = state
        .registry
        .get_by_share_token(token)
        .await
        .map_err(|e| match e {
            e if e.is_not_found() => ApiError::not_found("unknown share link"),
            e => e.into(),
        })?;
    if !session.is_live {
        return Err(ApiError::gone("session is no longer live"));
    }
    Ok(session)
}

/// WebSocket upgrade handler
pub async fn live_handler(
    MaybeIdentity(username): MaybeIdentity,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
) -> Result<Response, ApiError> {
    let session = shared_session(&state, &query.token).await?;
    let username = username.unwrap_or_else(guest_name);
    let is_owner = username == session.user;

    Ok(ws
        .on_upgrade(move |socket| {
            session::handle_socket(socket, state, session.id, username, is_owner)
        })
        .into_response())
}
