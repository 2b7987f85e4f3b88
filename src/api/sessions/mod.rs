//! Sessions API endpoints
//!
//! GET    /api/sessions                 - List own sessions
//! POST   /api/sessions                 - Create a session
//! GET    /api/sessions/last            - Most recent own session (or null)
//! GET    /api/sessions/:id             - Session details
//! PATCH  /api/sessions/:id             - Rename
//! DELETE /api/sessions/:id             - Delete with its recording
//! POST   /api/sessions/:id/share       - Enable or disable live sharing
//! POST   /api/sessions/:id/end         - End the recording
//! GET    /api/sessions/:id/data        - Replay events
//! POST   /api/sessions/:id/permission  - set_mode / grant / revoke
//! GET    /api/sessions/:id/viewers     - Room membership

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use termcast_core::ViewerInfo;
use termcast_replay::{PermissionMode, ReplayEvent, Session, SessionMode};
use tracing::info;

use super::response::{ok, ApiError, ApiResult};
use crate::middleware::identity::{MaybeIdentity, RequireIdentity};
use crate::server::AppState;

/// A session as listed to its owner
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    /// Connected room members, only for live sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_count: Option<usize>,
}

impl SessionView {
    fn new(session: Session, state: &AppState) -> Self {
        let viewer_count = session
            .is_live
            .then(|| state.hub.viewer_count(&session.id));
        Self {
            session,
            viewer_count,
        }
    }
}

/// Request to create a session.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Display name; blank gets a generated one
    #[serde(default)]
    pub name: Option<String>,
    /// `local` (default) or `isolated`
    #[serde(default)]
    pub mode: Option<String>,
}

/// Request to rename a session.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Request to toggle live sharing.
#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub enable: bool,
    /// Viewer policy; `view_only` when omitted
    #[serde(default)]
    pub mode: Option<String>,
}

/// Request to change viewer permissions.
#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    /// `set_mode`, `grant` or `revoke`
    pub action: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Plain status acknowledgement
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    fn new(status: &'static str) -> Self {
        Self { status }
    }
}

/// Result of a share toggle
#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PermissionMode>,
}

/// Result of a permission change
#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PermissionMode>,
    /// Whether a connected viewer was affected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
}

/// Result of a rename
#[derive(Debug, Serialize)]
pub struct RenameResponse {
    pub status: &'static str,
    pub name: String,
}

/// Load a session and check that `username` owns it.
async fn owned_session(state: &AppState, id: &str, username: &str) -> Result<Session, ApiError> {
    let session = state.registry.get(id).await?;
    if session.user != username {
        return Err(ApiError::forbidden("session belongs to another user"));
    }
    Ok(session)
}

fn parse_session_mode(raw: Option<&str>) -> Result<SessionMode, ApiError> {
    match raw.filter(|m| !m.is_empty()) {
        None => Ok(SessionMode::Local),
        Some(m) => m.parse().map_err(ApiError::bad_request),
    }
}

fn parse_permission_mode(raw: Option<&str>) -> Result<Option<PermissionMode>, ApiError> {
    match raw.filter(|m| !m.is_empty()) {
        None => Ok(None),
        Some(m) => m.parse().map(Some).map_err(ApiError::bad_request),
    }
}

/// List sessions owned by the requester.
async fn list_sessions(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
) -> ApiResult<Vec<SessionView>> {
    let sessions = state.registry.list(&username).await?;
    ok(sessions
        .into_iter()
        .map(|s| SessionView::new(s, &state))
        .collect())
}

/// Create a new session.
async fn create_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Session> {
    let mode = parse_session_mode(request.mode.as_deref())?;
    let name = request.name.unwrap_or_default();
    let session = state.registry.create(&username, &name, mode).await?;
    ok(session)
}

/// Most recent session of the requester; `null` if there is none.
async fn last_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
) -> ApiResult<Option<SessionView>> {
    match state.registry.most_recent(&username).await {
        Ok(session) => ok(Some(SessionView::new(session, &state))),
        Err(e) if e.is_not_found() => ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get session details.
async fn get_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionView> {
    let session = owned_session(&state, &id, &username).await?;
    ok(SessionView::new(session, &state))
}

/// Delete a session and its recording.
async fn delete_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusResponse> {
    state.registry.delete(&id, &username).await?;
    ok(StatusResponse::new("deleted"))
}

/// Rename a session.
async fn rename_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<RenameResponse> {
    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request("name is required"))?;

    owned_session(&state, &id, &username).await?;
    state.registry.rename(&id, &username, &name).await?;
    ok(RenameResponse {
        status: "renamed",
        name,
    })
}

/// Enable or disable live sharing.
async fn share_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ShareRequest>,
) -> ApiResult<ShareResponse> {
    owned_session(&state, &id, &username).await?;

    if !request.enable {
        state.hub.stop_sharing(&id).await?;
        return ok(ShareResponse {
            status: "stopped",
            share_token: None,
            share_url: None,
            mode: None,
        });
    }

    let mode = parse_permission_mode(request.mode.as_deref())?.unwrap_or_default();
    let token = state.hub.start_sharing(&id, mode).await?;
    info!(session_id = %id, mode = %mode, "Session shared");
    ok(ShareResponse {
        status: "live",
        share_url: Some(format!("/live/{token}")),
        share_token: Some(token),
        mode: Some(mode),
    })
}

/// End the recording of a session no terminal is attached to.
async fn end_session(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusResponse> {
    owned_session(&state, &id, &username).await?;
    if !state.registry.is_active(&id).await {
        return Err(ApiError::conflict("session is not running"));
    }
    state.registry.end_session(&id).await?;
    ok(StatusResponse::new("ended"))
}

/// Replay events; open to anyone while the session is live.
async fn session_data(
    MaybeIdentity(username): MaybeIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ReplayEvent>> {
    let session = state.registry.get(&id).await?;
    let is_owner = username.as_deref() == Some(session.user.as_str());
    if !is_owner && !session.is_live {
        return Err(ApiError::forbidden("session is not shared"));
    }
    ok(state.registry.session_data(&id).await?)
}

/// Change the permission mode or a viewer's write access.
async fn update_permission(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PermissionRequest>,
) -> ApiResult<PermissionResponse> {
    owned_session(&state, &id, &username).await?;

    match request.action.as_str() {
        "set_mode" => {
            let mode = parse_permission_mode(request.mode.as_deref())?
                .ok_or_else(|| ApiError::bad_request("mode is required"))?;
            state.hub.set_permission_mode(&id, mode).await?;
            ok(PermissionResponse {
                status: "updated",
                mode: Some(mode),
                applied: None,
            })
        }
        action @ ("grant" | "revoke") => {
            let viewer = request
                .username
                .filter(|u| !u.is_empty())
                .ok_or_else(|| ApiError::bad_request("username is required"))?;
            let (status, applied) = if action == "grant" {
                ("granted", state.hub.grant(&id, &viewer).await?)
            } else {
                ("revoked", state.hub.revoke(&id, &viewer).await?)
            };
            ok(PermissionResponse {
                status,
                mode: None,
                applied: Some(applied),
            })
        }
        other => Err(ApiError::bad_request(format!("invalid action: {other}"))),
    }
}

/// Current members of the session's live room.
async fn list_viewers(
    RequireIdentity(username): RequireIdentity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ViewerInfo>> {
    owned_session(&state, &id, &username).await?;
    ok(state.hub.viewers(&id).unwrap_or_default())
}

/// Create sessions routes.
pub fn sessions_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/last", get(last_session))
        .route(
            "/api/sessions/:id",
            get(get_session)
                .patch(rename_session)
                .delete(delete_session),
        )
        .route("/api/sessions/:id/share", post(share_session))
        .route("/api/sessions/:id/end", post(end_session))
        .route("/api/sessions/:id/data", get(session_data))
        .route("/api/sessions/:id/permission", post(update_permission))
        .route("/api/sessions/:id/viewers", get(list_viewers))
        .with_state(state)
}

#[cfg(test)]
mod tests;
