//! Session record operations for EventStore

use super::event_store::EventStore;
use super::helpers::{format_timestamp, row_to_session};
use crate::error::{Error, Result};
use crate::session::{PermissionMode, Session};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

const SESSION_COLUMNS: &str = "id, user, name, mode, container_name, created_at, ended_at, \
     duration_ms, is_live, share_token, permission_mode";

/// Outcome of the startup liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions that were flagged live or left open and got closed
    pub closed: u64,
}

fn not_found(id: &str) -> Error {
    Error::NotFound(format!("session {id}"))
}

impl EventStore {
    /// Insert a new session record
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, user, name, mode, container_name, created_at, ended_at,
                duration_ms, is_live, share_token, permission_mode
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user)
        .bind(&session.name)
        .bind(session.mode.as_str())
        .bind(&session.container_name)
        .bind(format_timestamp(session.created_at))
        .bind(session.ended_at.map(format_timestamp))
        .bind(session.duration_ms)
        .bind(i64::from(session.is_live))
        .bind(&session.share_token)
        .bind(session.permission_mode.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        debug!("Created session {}", session.id);
        Ok(())
    }

    /// Get a session by ID
    #[instrument(skip(self))]
    pub async fn get_session(&self, id: &str) -> Result<Session> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .ok_or_else(|| not_found(id))?;

        row_to_session(row)
    }

    /// Get a session by its share token
    #[instrument(skip(self, token))]
    pub async fn get_session_by_share_token(&self, token: &str) -> Result<Session> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE share_token = ?1"
        ))
        .bind(token)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::NotFound("share token".to_string()))?;

        row_to_session(row)
    }

    /// List sessions owned by a user, newest first
    #[instrument(skip(self))]
    pub async fn list_sessions(&self, user: &str) -> Result<Vec<Session>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(user)
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(row_to_session).collect()
    }

    /// Newest session owned by a user, ended or not
    #[instrument(skip(self))]
    pub async fn latest_session(&self, user: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(user)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        row.map(row_to_session).transpose()
    }

    /// Rename a session; only the owner's rename matches a row
    #[instrument(skip(self))]
    pub async fn rename_session(&self, id: &str, user: &str, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET name = ?3 WHERE id = ?1 AND user = ?2")
            .bind(id)
            .bind(user)
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Record the container handle a session runs in
    #[instrument(skip(self))]
    pub async fn set_container_name(&self, id: &str, container_name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET container_name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(container_name)
            .execute(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Delete a session and its event log; only the owner's delete matches
    #[instrument(skip(self))]
    pub async fn delete_session(&self, id: &str, user: &str) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1 AND user = ?2")
            .bind(id)
            .bind(user)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        sqlx::query("DELETE FROM terminal_events WHERE session_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        info!("Deleted session {}", id);
        Ok(())
    }

    /// Turn live sharing on for an open session
    ///
    /// Returns `Ok(false)` when the session exists but has already ended.
    #[instrument(skip(self, token))]
    pub async fn start_live(&self, id: &str, token: &str, mode: PermissionMode) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_live = 1, share_token = ?2, permission_mode = ?3
            WHERE id = ?1 AND ended_at IS NULL
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(mode.as_str())
        .execute(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            self.get_session(id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Turn live sharing off
    #[instrument(skip(self))]
    pub async fn stop_live(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET is_live = 0 WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Persist a new viewer permission mode
    #[instrument(skip(self))]
    pub async fn update_permission_mode(&self, id: &str, mode: PermissionMode) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET permission_mode = ?2 WHERE id = ?1")
            .bind(id)
            .bind(mode.as_str())
            .execute(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Clear the end marker of a session that is being attached again
    #[instrument(skip(self))]
    pub async fn reopen_session(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET ended_at = NULL WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Close a session: stamp the end, add the attached time, drop liveness
    #[instrument(skip(self))]
    pub async fn end_session(&self, id: &str, ended_at: DateTime<Utc>, elapsed_ms: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET ended_at = ?2, duration_ms = duration_ms + ?3, is_live = 0
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(format_timestamp(ended_at))
        .bind(elapsed_ms)
        .execute(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        debug!("Ended session {} after {}ms", id, elapsed_ms);
        Ok(())
    }

    /// Close every session left open or live by a previous process
    ///
    /// Sessions listed in `attached` are currently running and are skipped.
    #[instrument(skip(self, attached))]
    pub async fn sweep_stale(&self, attached: &HashSet<String>) -> Result<SweepReport> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE is_live = 1 OR ended_at IS NULL"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let now = format_timestamp(Utc::now());
        let mut report = SweepReport::default();
        for row in rows {
            let session = row_to_session(row)?;
            if attached.contains(&session.id) {
                continue;
            }
            sqlx::query(
                "UPDATE sessions SET is_live = 0, ended_at = COALESCE(ended_at, ?2) WHERE id = ?1",
            )
            .bind(&session.id)
            .bind(&now)
            .execute(self.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
            report.closed += 1;
        }

        if report.closed > 0 {
            info!(closed = report.closed, "Closed stale sessions");
        }
        Ok(report)
    }
}
