//! Disposition definition persistence

use chrono::Utc;
use sqlx::Row;
use tracing::info;

use super::{is_unique_violation, DatabaseManager};
use crate::error::{DialerError, Result};
use crate::types::{new_id, CallListDisposition, NewDisposition};

const DISPOSITION_COLUMNS: &str = "id, call_list_id, code, name, category, color, sort_order,
     remove_from_list, schedule_callback, add_to_dnc, move_to_list_id, move_to_list_name,
     update_lead_status, update_opp_stage, is_active, created_at";

impl CallListDisposition {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        Ok(CallListDisposition {
            id: row.try_get("id")?,
            call_list_id: row.try_get("call_list_id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            color: row.try_get("color")?,
            sort_order: row.try_get("sort_order")?,
            remove_from_list: row.try_get("remove_from_list")?,
            schedule_callback: row.try_get("schedule_callback")?,
            add_to_dnc: row.try_get("add_to_dnc")?,
            move_to_list_id: row.try_get("move_to_list_id")?,
            move_to_list_name: row.try_get("move_to_list_name")?,
            update_lead_status: row.try_get("update_lead_status")?,
            update_opp_stage: row.try_get("update_opp_stage")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl DatabaseManager {
    /// Define a disposition; the code must be unused within its scope
    pub async fn insert_disposition(&self, new: &NewDisposition) -> Result<CallListDisposition> {
        if new.code.trim().is_empty() {
            return Err(DialerError::validation("disposition code cannot be empty"));
        }
        if new.name.trim().is_empty() {
            return Err(DialerError::validation("disposition name cannot be empty"));
        }
        if let Some(list_id) = &new.call_list_id {
            self.require_call_list(list_id).await?;
        }

        let now = Utc::now();
        let id = new_id();

        sqlx::query(
            "INSERT INTO call_list_dispositions (id, call_list_id, code, name, category, color, sort_order,
                remove_from_list, schedule_callback, add_to_dnc, move_to_list_id, move_to_list_name,
                update_lead_status, update_opp_stage, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(&new.call_list_id)
        .bind(&new.code)
        .bind(&new.name)
        .bind(&new.category)
        .bind(&new.color)
        .bind(new.sort_order)
        .bind(new.remove_from_list)
        .bind(new.schedule_callback)
        .bind(new.add_to_dnc)
        .bind(&new.move_to_list_id)
        .bind(&new.move_to_list_name)
        .bind(&new.update_lead_status)
        .bind(&new.update_opp_stage)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DialerError::validation(format!("disposition code '{}' already defined in this scope", new.code))
            } else {
                e.into()
            }
        })?;

        info!(
            "🏷️ Defined disposition {} ({})",
            new.code,
            new.call_list_id.as_deref().unwrap_or("global")
        );

        Ok(CallListDisposition {
            id,
            call_list_id: new.call_list_id.clone(),
            code: new.code.clone(),
            name: new.name.clone(),
            category: new.category.clone(),
            color: new.color.clone(),
            sort_order: new.sort_order,
            remove_from_list: new.remove_from_list,
            schedule_callback: new.schedule_callback,
            add_to_dnc: new.add_to_dnc,
            move_to_list_id: new.move_to_list_id.clone(),
            move_to_list_name: new.move_to_list_name.clone(),
            update_lead_status: new.update_lead_status.clone(),
            update_opp_stage: new.update_opp_stage.clone(),
            is_active: true,
            created_at: now,
        })
    }

    pub async fn get_disposition(&self, disposition_id: &str) -> Result<Option<CallListDisposition>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM call_list_dispositions WHERE id = ?",
            DISPOSITION_COLUMNS
        ))
        .bind(disposition_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(CallListDisposition::from_row).transpose()
    }

    /// Global definition for `code`, active or not
    pub async fn find_global_disposition(&self, code: &str) -> Result<Option<CallListDisposition>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM call_list_dispositions WHERE call_list_id IS NULL AND code = ?",
            DISPOSITION_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(CallListDisposition::from_row).transpose()
    }

    /// Global definitions plus those scoped to `list_id`, when given
    pub async fn list_dispositions(&self, list_id: Option<&str>, active_only: bool) -> Result<Vec<CallListDisposition>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM call_list_dispositions
             WHERE (call_list_id IS NULL OR call_list_id = ?)
               AND (? = 0 OR is_active = 1)
             ORDER BY sort_order ASC, code ASC",
            DISPOSITION_COLUMNS
        ))
        .bind(list_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(CallListDisposition::from_row).collect()
    }

    /// Retire a definition; definitions are never deleted
    pub async fn deactivate_disposition(&self, disposition_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE call_list_dispositions SET is_active = 0 WHERE id = ?")
            .bind(disposition_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DialerError::not_found(format!("disposition {}", disposition_id)));
        }
        info!("🏷️ Disposition {} deactivated", disposition_id);
        Ok(())
    }
}
