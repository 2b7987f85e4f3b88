//! Termcast Replay - Session Log
//!
//! This crate provides the persistence layer for Termcast:
//! - Session: session records, execution modes and permission modes
//! - Event: recorded terminal events and their replay form
//! - Store: SQLite persistence and the asynchronous event writer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod session;
pub mod store;

pub use error::{Error, Result};
pub use event::{to_replay, EventType, NewEvent, ReplayEvent, SessionEvent};
pub use session::{PermissionMode, Session, SessionMode};
pub use store::{
    append_event, count_session_events, default_data_dir, default_db_path, get_session_events,
    EventRecorder, EventStore, EventStoreTrait, SweepReport,
};
