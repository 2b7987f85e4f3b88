//! WebSocket module for Termcast
//!
//! Provides real-time endpoints:
//! - /ws/terminal - Shell bridge
//! - /ws/live - Live room of a shared session

pub mod live;
pub mod terminal;

pub use live::live_handler;
pub use terminal::terminal_handler;

use axum::{routing::get, Router};

use crate::server::AppState;

/// Create the WebSocket router
pub fn websocket_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/terminal", get(terminal_handler))
        .route("/ws/live", get(live_handler))
        .with_state(state)
}
