//! Append-only call audit log

use sqlx::{Row, SqliteConnection};

use super::DatabaseManager;
use crate::error::Result;
use crate::types::CallLog;

const LOG_COLUMNS: &str = "id, call_list_id, item_id, lead_id, opportunity_id, contact_id, agent_id,
     outcome, disposition_id, notes, phone, call_started_at, talk_time_ms, logged_at";

impl CallLog {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(CallLog {
            id: row.try_get("id")?,
            call_list_id: row.try_get("call_list_id")?,
            item_id: row.try_get("item_id")?,
            lead_id: row.try_get("lead_id")?,
            opportunity_id: row.try_get("opportunity_id")?,
            contact_id: row.try_get("contact_id")?,
            agent_id: row.try_get("agent_id")?,
            outcome: row.try_get("outcome")?,
            disposition_id: row.try_get("disposition_id")?,
            notes: row.try_get("notes")?,
            phone: row.try_get("phone")?,
            call_started_at: row.try_get("call_started_at")?,
            talk_time_ms: row.try_get("talk_time_ms")?,
            logged_at: row.try_get("logged_at")?,
        })
    }
}

impl DatabaseManager {
    /// Logs for one item, oldest first
    pub async fn list_item_call_logs(&self, item_id: &str) -> Result<Vec<CallLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM call_logs WHERE item_id = ? ORDER BY logged_at ASC, id ASC",
            LOG_COLUMNS
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(CallLog::from_row).collect()
    }

    /// Most recent logs for a list
    pub async fn list_call_logs(&self, list_id: &str, limit: i64) -> Result<Vec<CallLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM call_logs WHERE call_list_id = ? ORDER BY logged_at DESC, id DESC LIMIT ?",
            LOG_COLUMNS
        ))
        .bind(list_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(CallLog::from_row).collect()
    }
}

pub(crate) async fn insert_call_log_with(conn: &mut SqliteConnection, log: &CallLog) -> Result<()> {
    sqlx::query(
        "INSERT INTO call_logs (id, call_list_id, item_id, lead_id, opportunity_id, contact_id, agent_id,
            outcome, disposition_id, notes, phone, call_started_at, talk_time_ms, logged_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&log.id)
    .bind(&log.call_list_id)
    .bind(&log.item_id)
    .bind(&log.lead_id)
    .bind(&log.opportunity_id)
    .bind(&log.contact_id)
    .bind(&log.agent_id)
    .bind(&log.outcome)
    .bind(&log.disposition_id)
    .bind(&log.notes)
    .bind(&log.phone)
    .bind(log.call_started_at)
    .bind(log.talk_time_ms)
    .bind(log.logged_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
