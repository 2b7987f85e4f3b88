//! Command history endpoints
//!
//! GET    /api/history?mode= - Saved commands, optionally for one mode
//! POST   /api/history       - Save a command
//! DELETE /api/history?mode= - Clear one mode or everything

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use termcast_core::CommandEntry;

use super::response::{ok, ApiResult};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveCommandRequest {
    #[serde(default)]
    pub mode: String,
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryStatus {
    pub status: &'static str,
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<CommandEntry>> {
    ok(state.history.list(&query.mode).await)
}

async fn save_command(
    State(state): State<AppState>,
    Json(request): Json<SaveCommandRequest>,
) -> ApiResult<HistoryStatus> {
    state.history.add(&request.mode, &request.command).await?;
    ok(HistoryStatus { status: "saved" })
}

async fn clear_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryStatus> {
    state.history.clear(&query.mode).await?;
    ok(HistoryStatus { status: "cleared" })
}

/// Create history routes.
pub fn history_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/history",
            get(list_history).post(save_command).delete(clear_history),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::state::testing::app_state;

    async fn save(state: &AppState, mode: &str, command: &str) {
        let response = save_command(
            State(state.clone()),
            Json(SaveCommandRequest {
                mode: mode.to_string(),
                command: command.to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.data.unwrap().status, "saved");
    }

    #[tokio::test]
    async fn test_save_list_and_clear_by_mode() {
        let (state, _dir) = app_state().await;
        save(&state, "local", "ls -la").await;
        save(&state, "isolated", "apt update").await;
        save(&state, "local", "git status").await;

        let all = list_history(State(state.clone()), Query(HistoryQuery::default()))
            .await
            .unwrap();
        assert_eq!(all.0.data.unwrap().len(), 3);

        let local = list_history(
            State(state.clone()),
            Query(HistoryQuery {
                mode: "local".to_string(),
            }),
        )
        .await
        .unwrap();
        let local = local.0.data.unwrap();
        assert_eq!(local.len(), 2);
        assert!(local.iter().all(|e| e.mode == "local"));

        let response = clear_history(
            State(state.clone()),
            Query(HistoryQuery {
                mode: "local".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.data.unwrap().status, "cleared");

        let rest = list_history(State(state), Query(HistoryQuery::default()))
            .await
            .unwrap();
        let rest = rest.0.data.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].command, "apt update");
    }
}
