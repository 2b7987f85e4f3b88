//! Helper functions for store module

use crate::error::Error;
use crate::event::{EventType, SessionEvent};
use crate::session::{PermissionMode, Session, SessionMode};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Fixed-width RFC 3339 so that text ordering matches time ordering
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid timestamp: {e}")))
}

/// Convert a SQLite row to a Session
pub(crate) fn row_to_session(row: SqliteRow) -> Result<Session, Error> {
    let mode_str: String = row.get("mode");
    let permission_str: String = row.get("permission_mode");
    let created_at_str: String = row.get("created_at");
    let ended_at_str: Option<String> = row.get("ended_at");
    let is_live: i64 = row.get("is_live");

    let mode: SessionMode = mode_str
        .parse()
        .map_err(|e: String| Error::Serialization(e))?;
    let permission_mode: PermissionMode = permission_str
        .parse()
        .map_err(|e: String| Error::Serialization(e))?;
    let created_at = parse_timestamp(&created_at_str)?;
    let ended_at = ended_at_str.as_deref().map(parse_timestamp).transpose()?;

    Ok(Session {
        id: row.get("id"),
        user: row.get("user"),
        name: row.get("name"),
        mode,
        container_name: row.get("container_name"),
        created_at,
        ended_at,
        duration_ms: row.get("duration_ms"),
        is_live: is_live != 0,
        share_token: row.get("share_token"),
        permission_mode,
    })
}

/// Convert a SQLite row to a SessionEvent
pub(crate) fn row_to_event(row: SqliteRow) -> Result<SessionEvent, Error> {
    let event_type_str: String = row.get("event_type");
    let event_type: EventType = event_type_str
        .parse()
        .map_err(|e: String| Error::Serialization(e))?;

    Ok(SessionEvent {
        id: row.get("id"),
        session_id: row.get("session_id"),
        event_type,
        data: row.get("data"),
        timestamp: row.get("timestamp"),
    })
}

/// Get the default data directory for Termcast
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".termcast"))
        .unwrap_or_else(|| std::path::PathBuf::from(".termcast"))
}

/// Get the default database path
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join("sessions.db")
}
