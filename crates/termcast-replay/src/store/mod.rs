//! Store - Session and event persistence using SQLite
//!
//! This module provides the storage layer for session records and the
//! terminal event log. It uses sqlx for async SQLite access.

mod event_store;
mod events;
mod helpers;
mod recorder;
mod sessions;
mod traits;

#[cfg(test)]
mod tests;

pub use event_store::EventStore;
pub use events::*;
pub use helpers::{default_data_dir, default_db_path};
pub use recorder::{EventRecorder, DEFAULT_QUEUE_CAPACITY};
pub use sessions::SweepReport;
pub use traits::EventStoreTrait;
