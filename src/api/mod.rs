//! Web API module for Termcast
//!
//! Provides REST API endpoints for:
//! - Session management, sharing and viewer permissions
//! - Share link resolution
//! - Login
//! - Command history and execution modes

pub mod auth;
pub mod health;
pub mod history;
pub mod live;
pub mod modes;
pub mod response;
pub mod sessions;

use axum::Router;

use crate::server::AppState;

pub use auth::auth_routes;
pub use health::health_routes;
pub use history::history_routes;
pub use live::live_routes;
pub use modes::modes_routes;
pub use response::ApiError;
pub use sessions::sessions_routes;

/// Create the API router with all endpoints
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(sessions_routes(state.clone()))
        .merge(live_routes(state.clone()))
        .merge(auth_routes(state.clone()))
        .merge(history_routes(state.clone()))
        .merge(modes_routes(state))
}
