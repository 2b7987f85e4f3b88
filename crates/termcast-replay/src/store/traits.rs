//! Trait for event storage backends

use crate::error::Result;
use crate::event::{NewEvent, SessionEvent};

/// Trait for event storage backends
///
/// The event writer only depends on this trait, so a backend can be swapped
/// (or mocked) without touching the recording path.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventStoreTrait: Send + Sync {
    /// Append an event, returning its insertion sequence
    async fn append(&self, event: &NewEvent) -> Result<i64>;

    /// Get events for a session in store order
    async fn get_events(&self, session_id: &str) -> Result<Vec<SessionEvent>>;

    /// Get the event store name (for logging)
    fn name(&self) -> &'static str;
}
