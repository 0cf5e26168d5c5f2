//! Call list persistence

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::DatabaseManager;
use crate::error::{DialerError, Result};
use crate::filter::FilterExpr;
use crate::types::{new_id, CadenceType, CallList, ListType, NewCallList, TargetObject};

const LIST_COLUMNS: &str = "id, name, description, list_type, target_object, filter_criteria, cadence_type,
     cadence_hours, max_attempts, cooldown_days, priority, is_active, last_refreshed_at,
     total_count, pending_count, created_at, updated_at";

impl CallList {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let filter_raw: Option<String> = row.try_get("filter_criteria")?;
        let filter_criteria = filter_raw
            .as_deref()
            .map(FilterExpr::from_json)
            .transpose()?;

        Ok(CallList {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            list_type: ListType::parse(&row.try_get::<String, _>("list_type")?)?,
            target_object: TargetObject::parse(&row.try_get::<String, _>("target_object")?)?,
            filter_criteria,
            cadence_type: CadenceType::parse(&row.try_get::<String, _>("cadence_type")?)?,
            cadence_hours: row.try_get("cadence_hours")?,
            max_attempts: row.try_get("max_attempts")?,
            cooldown_days: row.try_get("cooldown_days")?,
            priority: row.try_get("priority")?,
            is_active: row.try_get("is_active")?,
            last_refreshed_at: row.try_get("last_refreshed_at")?,
            total_count: row.try_get("total_count")?,
            pending_count: row.try_get("pending_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl DatabaseManager {
    /// Insert a new list; the caller has already validated and defaulted it
    pub async fn insert_call_list(&self, new: &NewCallList, max_attempts: i32, cadence_hours: Option<i32>) -> Result<CallList> {
        let mut conn = self.pool.acquire().await?;
        insert_call_list_with(&mut conn, new, max_attempts, cadence_hours).await
    }

    pub async fn get_call_list(&self, list_id: &str) -> Result<Option<CallList>> {
        let row = sqlx::query(&format!("SELECT {} FROM call_lists WHERE id = ?", LIST_COLUMNS))
            .bind(list_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(CallList::from_row).transpose()
    }

    /// Like [`get_call_list`](Self::get_call_list) but unknown ids are `NotFound`
    pub async fn require_call_list(&self, list_id: &str) -> Result<CallList> {
        self.get_call_list(list_id)
            .await?
            .ok_or_else(|| DialerError::not_found(format!("call list {}", list_id)))
    }

    /// Oldest list carrying `name`
    pub async fn find_call_list_by_name(&self, name: &str) -> Result<Option<CallList>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM call_lists WHERE name = ? ORDER BY created_at ASC LIMIT 1",
            LIST_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(CallList::from_row).transpose()
    }

    pub async fn list_call_lists(&self, active_only: bool) -> Result<Vec<CallList>> {
        let sql = if active_only {
            format!("SELECT {} FROM call_lists WHERE is_active = 1 ORDER BY priority DESC, name ASC", LIST_COLUMNS)
        } else {
            format!("SELECT {} FROM call_lists ORDER BY priority DESC, name ASC", LIST_COLUMNS)
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(CallList::from_row).collect()
    }

    pub async fn list_dynamic_lists(&self) -> Result<Vec<CallList>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM call_lists WHERE is_active = 1 AND list_type = 'DYNAMIC' ORDER BY priority DESC",
            LIST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(CallList::from_row).collect()
    }

    /// Retire a list; lists are never hard-deleted
    pub async fn deactivate_call_list(&self, list_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE call_lists SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(list_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DialerError::not_found(format!("call list {}", list_id)));
        }
        info!("📋 Call list {} deactivated", list_id);
        Ok(())
    }

    /// Recompute and cache total/pending counts, stamping the refresh time when given
    pub async fn update_list_counts(&self, list_id: &str, refreshed_at: Option<DateTime<Utc>>) -> Result<(i64, i64)> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status IN ('PENDING', 'RESCHEDULED') THEN 1 ELSE 0 END), 0) AS pending
             FROM call_list_items
             WHERE call_list_id = ? AND status NOT IN ('COMPLETED', 'REMOVED')",
        )
        .bind(list_id)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        let pending: i64 = row.try_get("pending")?;
        let now = Utc::now();

        sqlx::query(
            "UPDATE call_lists SET
                total_count = ?,
                pending_count = ?,
                last_refreshed_at = COALESCE(?, last_refreshed_at),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(total)
        .bind(pending)
        .bind(refreshed_at)
        .bind(now)
        .bind(list_id)
        .execute(&self.pool)
        .await?;

        debug!("List {} counts: total={} pending={}", list_id, total, pending);
        Ok((total, pending))
    }
}

pub(crate) async fn insert_call_list_with(
    conn: &mut SqliteConnection,
    new: &NewCallList,
    max_attempts: i32,
    cadence_hours: Option<i32>,
) -> Result<CallList> {
    let now = Utc::now();
    let id = new_id();
    let filter_json = new.filter_criteria.as_ref().map(FilterExpr::to_json).transpose()?;

    sqlx::query(
        "INSERT INTO call_lists (id, name, description, list_type, target_object, filter_criteria,
            cadence_type, cadence_hours, max_attempts, cooldown_days, priority, is_active,
            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&id)
    .bind(&new.name)
    .bind(&new.description)
    .bind(new.list_type.as_str())
    .bind(new.target_object.as_str())
    .bind(filter_json)
    .bind(new.cadence_type.as_str())
    .bind(cadence_hours)
    .bind(max_attempts)
    .bind(new.cooldown_days)
    .bind(new.priority)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    info!("📋 Created call list '{}' ({}, {})", new.name, new.list_type, id);

    Ok(CallList {
        id,
        name: new.name.clone(),
        description: new.description.clone(),
        list_type: new.list_type,
        target_object: new.target_object,
        filter_criteria: new.filter_criteria.clone(),
        cadence_type: new.cadence_type,
        cadence_hours,
        max_attempts,
        cooldown_days: new.cooldown_days,
        priority: new.priority,
        is_active: true,
        last_refreshed_at: None,
        total_count: 0,
        pending_count: 0,
        created_at: now,
        updated_at: now,
    })
}
