//! Live Hub - shared viewing of running sessions
//!
//! One room per shared session holds the owner connection, viewer
//! connections, the permission mode and a trailing output buffer that
//! backfills late joiners.

mod hub;
mod message;
mod room;


pub use hub::{LiveConfig, LiveConnection, LiveHub};
pub use message::{ClientMessage, Frame, LiveMessage, MessageKind, UsernameData};
pub use room::{ReplayBuffer, ViewerInfo, DEFAULT_REPLAY_BYTES};
