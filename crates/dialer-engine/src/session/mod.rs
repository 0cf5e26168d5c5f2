//! # Session Tracker
//!
//! Agent login, pause and logout plus per-session call counters. Every state
//! change is a single conditional `UPDATE`:
//!
//! - pause: `WHERE paused_at IS NULL`
//! - resume: `WHERE paused_at = <the pause being closed>`
//! - end: `WHERE ended_at IS NULL AND paused_at IS <the pause state read>`
//!
//! so a duplicated request changes nothing and pause time is never counted
//! twice. The tracker has no knowledge of dispositions; callers report each
//! completed call through [`SessionTracker::update_stats`].

use chrono::Utc;
use tracing::{info, warn};

use crate::database::DatabaseManager;
use crate::error::{DialerError, Result};
use crate::types::{CadenceType, CallOutcome, CallSession};

/// Attempts before a start or end that keeps racing is reported as a conflict
const RACE_RETRIES: usize = 3;

#[derive(Clone)]
pub struct SessionTracker {
    db: DatabaseManager,
}

impl SessionTracker {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Open a session for `user_id`, ending any session still open
    pub async fn start_session(&self, user_id: &str, list_id: Option<&str>, mode: CadenceType) -> Result<CallSession> {
        if user_id.trim().is_empty() {
            return Err(DialerError::validation("user_id cannot be empty"));
        }
        if let Some(list_id) = list_id {
            self.db.require_call_list(list_id).await?;
        }

        let mut last_error = None;
        for _ in 0..RACE_RETRIES {
            match self.db.open_session(user_id, list_id, mode, Utc::now()).await {
                Ok(session) => return Ok(session),
                Err(DialerError::Conflict(msg)) => {
                    warn!("⚠️ Session start for {} raced: {}", user_id, msg);
                    last_error = Some(DialerError::Conflict(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| DialerError::conflict(format!("could not open a session for {}", user_id))))
    }

    /// Close a session, folding any in-flight pause into its pause total
    pub async fn end_session(&self, session_id: &str, reason: &str) -> Result<CallSession> {
        for _ in 0..RACE_RETRIES {
            let session = self.db.require_session(session_id).await?;
            if !session.is_open() {
                return Err(DialerError::validation(format!("session {} already ended", session_id)));
            }

            if self.db.close_session(session_id, reason, session.paused_at, Utc::now()).await? == 1 {
                info!("⏹️ Ended session {} for {} ({})", session_id, session.user_id, reason);
                return self.db.require_session(session_id).await;
            }
            warn!("⚠️ Session {} changed while ending, retrying", session_id);
        }
        Err(DialerError::conflict(format!("session {} kept changing while ending", session_id)))
    }

    /// Pause a running session or resume a paused one
    pub async fn toggle_pause(&self, session_id: &str) -> Result<CallSession> {
        let session = self.db.require_session(session_id).await?;
        if !session.is_open() {
            return Err(DialerError::validation(format!("session {} has ended", session_id)));
        }

        let now = Utc::now();
        let changed = match session.paused_at {
            None => {
                let rows = self.db.mark_paused(session_id, now).await?;
                if rows == 1 {
                    info!("⏸️ Session {} paused", session_id);
                }
                rows
            }
            Some(paused_at) => {
                let pause_ms = session.open_pause_ms(now);
                let rows = self.db.mark_resumed(session_id, paused_at, pause_ms).await?;
                if rows == 1 {
                    info!("▶️ Session {} resumed after {} ms", session_id, pause_ms);
                }
                rows
            }
        };

        if changed == 0 {
            return Err(DialerError::conflict(format!(
                "session {} changed while toggling pause",
                session_id
            )));
        }
        self.db.require_session(session_id).await
    }

    /// Count one completed call against a session
    pub async fn update_stats(&self, session_id: &str, outcome: &CallOutcome) -> Result<CallSession> {
        if self.db.add_session_stats(session_id, outcome).await? == 0 {
            return Err(DialerError::not_found(format!("call session {}", session_id)));
        }
        self.db.require_session(session_id).await
    }

    pub async fn get_active_session(&self, user_id: &str) -> Result<Option<CallSession>> {
        self.db.get_open_session(user_id).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<CallSession> {
        self.db.require_session(session_id).await
    }
}
