//! Share link resolution
//!
//! GET /api/live/:token - Session metadata for a share token

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde::Serialize;
use termcast_replay::PermissionMode;

use super::response::{ok, ApiError, ApiResult};
use crate::server::AppState;

/// What a viewer sees before joining
#[derive(Debug, Serialize)]
pub struct LiveSessionInfo {
    pub session_id: String,
    pub name: String,
    pub owner: String,
    pub permission_mode: PermissionMode,
    pub viewer_count: usize,
}

/// Resolve a share token; 404 unknown, 410 no longer live.
async fn get_live_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<LiveSessionInfo> {
    let session = state
        .registry
        .get_by_share_token(&token)
        .await
        .map_err(|e| match e {
            e if e.is_not_found() => ApiError::not_found("unknown share link"),
            e => e.into(),
        })?;
    if !session.is_live {
        return Err(ApiError::gone("session is no longer live"));
    }

    ok(LiveSessionInfo {
        viewer_count: state.hub.viewer_count(&session.id),
        session_id: session.id,
        name: session.name,
        owner: session.user,
        permission_mode: session.permission_mode,
    })
}

/// Create live routes.
pub fn live_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/live/:token", get(get_live_session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::state::testing::app_state;
    use axum::http::StatusCode;
    use termcast_replay::SessionMode;

    #[tokio::test]
    async fn test_resolve_share_token() {
        let (state, _dir) = app_state().await;
        let session = state
            .registry
            .create("alice", "pairing", SessionMode::Local)
            .await
            .unwrap();
        let token = state
            .hub
            .start_sharing(&session.id, PermissionMode::SharedControl)
            .await
            .unwrap();

        let response = get_live_session(State(state.clone()), Path(token.clone()))
            .await
            .unwrap();
        let info = response.0.data.unwrap();
        assert_eq!(info.session_id, session.id);
        assert_eq!(info.name, "pairing");
        assert_eq!(info.owner, "alice");
        assert_eq!(info.permission_mode, PermissionMode::SharedControl);
        assert_eq!(info.viewer_count, 0);

        state.hub.stop_sharing(&session.id).await.unwrap();
        let err = get_live_session(State(state), Path(token))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (state, _dir) = app_state().await;
        let err = get_live_session(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
