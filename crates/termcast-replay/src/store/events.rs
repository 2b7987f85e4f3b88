//! Event operations for EventStore

use super::event_store::EventStore;
use super::helpers::row_to_event;
use crate::error::{Error, Result};
use crate::event::{NewEvent, SessionEvent};
use sqlx::Row;
use tracing::{debug, instrument};

/// Append an event to a session's log
#[instrument(skip(store, event), fields(session_id = %event.session_id, event_type = %event.event_type))]
pub async fn append_event(store: &EventStore, event: &NewEvent) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO terminal_events (session_id, event_type, data, timestamp)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&event.session_id)
    .bind(event.event_type.as_str())
    .bind(&event.data)
    .bind(event.timestamp)
    .execute(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    debug!(bytes = event.data.len(), "Recorded event");
    Ok(result.last_insert_rowid())
}

/// Get all events for a session, oldest first
#[instrument(skip(store))]
pub async fn get_session_events(store: &EventStore, session_id: &str) -> Result<Vec<SessionEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, event_type, data, timestamp
        FROM terminal_events
        WHERE session_id = ?1
        ORDER BY timestamp ASC, id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    rows.into_iter().map(row_to_event).collect()
}

/// Count events recorded for a session
#[instrument(skip(store))]
pub async fn count_session_events(store: &EventStore, session_id: &str) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM terminal_events WHERE session_id = ?1")
        .bind(session_id)
        .fetch_one(store.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(row.get("count"))
}
