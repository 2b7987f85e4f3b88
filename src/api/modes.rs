//! Execution modes offered to terminal clients
//!
//! GET /api/modes - `[{id, name, description, available}]`

use axum::{extract::State, routing::get, Router};
use serde::Serialize;
use termcast_replay::SessionMode;

use super::response::{ok, ApiResult};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ModeInfo {
    pub id: SessionMode,
    pub name: &'static str,
    pub description: &'static str,
    pub available: bool,
}

async fn list_modes(State(state): State<AppState>) -> ApiResult<Vec<ModeInfo>> {
    ok(vec![
        ModeInfo {
            id: SessionMode::Local,
            name: "Local",
            description: "Shell on the server host",
            available: true,
        },
        ModeInfo {
            id: SessionMode::Isolated,
            name: "Isolated",
            description: "Shell inside a per-session container",
            available: state.bridge.runtime().is_ready(),
        },
    ])
}

/// Create mode routes.
pub fn modes_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/modes", get(list_modes))
        .with_state(state)
}
