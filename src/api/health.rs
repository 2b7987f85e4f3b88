//! Health check endpoints.
//!
//! Provides:
//! - `/health` - simple "healthy" + version (for load balancers)
//! - `/health/detailed` - session and room counters, login required

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::middleware::identity::RequireIdentity;
use crate::server::AppState;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed health response
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Sessions with an active handle
    pub active_sessions: usize,
    /// Open terminal and viewer sockets
    pub connections: usize,
    pub isolated_available: bool,
    /// Events written / dropped by the recorder since start
    pub events_written: u64,
    pub events_failed: u64,
}

/// Simple health check for load balancers
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Runtime counters for operators
async fn detailed_health_check(
    RequireIdentity(_username): RequireIdentity,
    State(state): State<AppState>,
) -> Json<DetailedHealthResponse> {
    let recorder = state.registry.recorder();
    let status = if state.shutdown.is_shutting_down() {
        "draining"
    } else {
        "healthy"
    };
    Json(DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.registry.active_ids().await.len(),
        connections: state.shutdown.active_connections(),
        isolated_available: state.bridge.runtime().is_ready(),
        events_written: recorder.written(),
        events_failed: recorder.failed(),
    })
}

/// Create health routes
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .with_state(state)
}
