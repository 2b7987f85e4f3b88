//! Server module for Termcast
//!
//! Contains the main server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `state`: Services shared by handlers
//! - `init`: Server initialization and run loop

pub mod config;
mod init;
mod loader;
pub mod state;

// Re-export public API
pub use config::AppConfig;
pub use init::{build_router, build_state, open_registry, run};
pub use loader::load_config;
pub use state::AppState;
