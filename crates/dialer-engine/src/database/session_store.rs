//! Agent session persistence
//!
//! The partial unique index `idx_sessions_one_open_per_user` backs the
//! one-open-session-per-agent rule; writers that race past each other see a
//! UNIQUE violation instead of a second open row.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::{is_unique_violation, DatabaseManager};
use crate::error::{DialerError, Result};
use crate::types::{new_id, CadenceType, CallOutcome, CallSession};

const SESSION_COLUMNS: &str = "id, user_id, current_list_id, dialer_mode, started_at, ended_at, paused_at,
     total_pause_ms, total_calls, connected_calls, total_talk_time_ms, total_wrap_time_ms,
     termination_reason";

/// Termination reason stamped on a session displaced by a newer one
pub const NEW_SESSION_STARTED: &str = "new_session_started";

impl CallSession {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let mode: String = row.try_get("dialer_mode")?;
        Ok(CallSession {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            current_list_id: row.try_get("current_list_id")?,
            dialer_mode: CadenceType::parse(&mode)?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            paused_at: row.try_get("paused_at")?,
            total_pause_ms: row.try_get("total_pause_ms")?,
            total_calls: row.try_get("total_calls")?,
            connected_calls: row.try_get("connected_calls")?,
            total_talk_time_ms: row.try_get("total_talk_time_ms")?,
            total_wrap_time_ms: row.try_get("total_wrap_time_ms")?,
            termination_reason: row.try_get("termination_reason")?,
        })
    }

    /// Milliseconds spent in the current pause, if any
    pub(crate) fn open_pause_ms(&self, now: DateTime<Utc>) -> i64 {
        self.paused_at
            .map(|p| (now - p).num_milliseconds().max(0))
            .unwrap_or(0)
    }
}

impl DatabaseManager {
    /// End any open session for `user_id` and open a new one, atomically
    ///
    /// Returns `Conflict` when a concurrent start for the same user won the
    /// race for the open-session slot.
    pub async fn open_session(
        &self,
        user_id: &str,
        list_id: Option<&str>,
        mode: CadenceType,
        now: DateTime<Utc>,
    ) -> Result<CallSession> {
        let mut tx = self.begin_transaction().await?;

        if let Some(previous) = fetch_open_session_with(&mut tx, user_id).await? {
            if close_session_with(&mut tx, &previous.id, NEW_SESSION_STARTED, previous.paused_at, now).await? == 0 {
                tx.rollback().await?;
                return Err(DialerError::conflict(format!(
                    "session {} changed while being replaced",
                    previous.id
                )));
            }
            info!("⏹️ Ended session {} for {} (new_session_started)", previous.id, user_id);
        }

        let id = new_id();
        sqlx::query(
            "INSERT INTO call_sessions (id, user_id, current_list_id, dialer_mode, started_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(list_id)
        .bind(mode.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DialerError::conflict(format!("another session opened concurrently for {}", user_id))
            } else {
                e.into()
            }
        })?;

        tx.commit().await?;

        info!("▶️ Started session {} for {} ({})", id, user_id, mode);
        Ok(CallSession {
            id,
            user_id: user_id.to_string(),
            current_list_id: list_id.map(str::to_string),
            dialer_mode: mode,
            started_at: now,
            ended_at: None,
            paused_at: None,
            total_pause_ms: 0,
            total_calls: 0,
            connected_calls: 0,
            total_talk_time_ms: 0,
            total_wrap_time_ms: 0,
            termination_reason: None,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<CallSession>> {
        let row = sqlx::query(&format!("SELECT {} FROM call_sessions WHERE id = ?", SESSION_COLUMNS))
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(CallSession::from_row).transpose()
    }

    pub async fn require_session(&self, session_id: &str) -> Result<CallSession> {
        self.get_session(session_id)
            .await?
            .ok_or_else(|| DialerError::not_found(format!("call session {}", session_id)))
    }

    pub async fn get_open_session(&self, user_id: &str) -> Result<Option<CallSession>> {
        let mut conn = self.pool.acquire().await?;
        fetch_open_session_with(&mut conn, user_id).await
    }

    /// Close an open session whose pause state is still `paused_at`
    ///
    /// Any pause in flight is folded into the pause total. Zero rows when the
    /// session already ended or its pause state moved on since it was read.
    pub async fn close_session(
        &self,
        session_id: &str,
        reason: &str,
        paused_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        close_session_with(&mut conn, session_id, reason, paused_at, now).await
    }

    /// Start a pause; zero rows when the session is closed or already paused
    pub async fn mark_paused(&self, session_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE call_sessions SET paused_at = ?
             WHERE id = ? AND ended_at IS NULL AND paused_at IS NULL",
        )
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// End the pause that began at `paused_at`; zero rows when it already ended
    pub async fn mark_resumed(&self, session_id: &str, paused_at: DateTime<Utc>, pause_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE call_sessions SET paused_at = NULL, total_pause_ms = total_pause_ms + ?
             WHERE id = ? AND ended_at IS NULL AND paused_at = ?",
        )
        .bind(pause_ms)
        .bind(session_id)
        .bind(paused_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn add_session_stats(&self, session_id: &str, outcome: &CallOutcome) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE call_sessions SET
                total_calls = total_calls + 1,
                connected_calls = connected_calls + ?,
                total_talk_time_ms = total_talk_time_ms + ?,
                total_wrap_time_ms = total_wrap_time_ms + ?
             WHERE id = ?",
        )
        .bind(i64::from(outcome.connected))
        .bind(outcome.talk_time_ms.max(0))
        .bind(outcome.wrap_time_ms.max(0))
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        debug!("Session {} stats updated: {:?}", session_id, outcome);
        Ok(result.rows_affected())
    }
}

async fn fetch_open_session_with(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<CallSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM call_sessions WHERE user_id = ? AND ended_at IS NULL",
        SESSION_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(CallSession::from_row).transpose()
}

async fn close_session_with(
    conn: &mut SqliteConnection,
    session_id: &str,
    reason: &str,
    paused_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<u64> {
    let extra_pause_ms = paused_at.map_or(0, |p| (now - p).num_milliseconds().max(0));
    let result = sqlx::query(
        "UPDATE call_sessions SET
            ended_at = ?,
            termination_reason = ?,
            total_pause_ms = total_pause_ms + ?,
            paused_at = NULL
         WHERE id = ? AND ended_at IS NULL AND paused_at IS ?",
    )
    .bind(now)
    .bind(reason)
    .bind(extra_pause_ms)
    .bind(session_id)
    .bind(paused_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
