//! Call list item persistence
//!
//! Status changes are written as conditional updates that restate the
//! transition's precondition in the `WHERE` clause; a zero row count means
//! the item moved on underneath the caller.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use super::DatabaseManager;
use crate::error::{DialerError, Result};
use crate::types::{new_id, AddedReason, CallListItem, ItemStatus, NewCallListItem, RecordKey, TargetObject};

const ITEM_COLUMNS: &str = "id, call_list_id, lead_id, opportunity_id, contact_id, account_id,
     display_name, phone, address, record_status, status, priority, attempt_count,
     assigned_to_id, assigned_at, next_attempt_at, expires_at, last_attempt_at,
     last_attempt_result, disposition, disposition_at, completed_at, added_reason,
     source_list_id, created_at, updated_at";

/// Full eligibility predicate; binds agent, now, now
const ELIGIBLE_PREDICATE: &str = "status IN ('PENDING', 'RESCHEDULED')
     AND (assigned_to_id IS NULL OR assigned_to_id = ?)
     AND attempt_count < (SELECT max_attempts FROM call_lists WHERE call_lists.id = call_list_items.call_list_id)
     AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
     AND (expires_at IS NULL OR expires_at > ?)";

/// Where a new item comes from
#[derive(Debug, Clone)]
pub struct ItemOrigin {
    pub reason: AddedReason,
    pub source_list_id: Option<String>,
    /// Used when the item carries no explicit priority
    pub default_priority: i32,
}

impl ItemOrigin {
    pub fn new(reason: AddedReason, default_priority: i32) -> Self {
        Self {
            reason,
            source_list_id: None,
            default_priority,
        }
    }

    pub fn moved_from(source_list_id: impl Into<String>, default_priority: i32) -> Self {
        Self {
            reason: AddedReason::MovedFromList,
            source_list_id: Some(source_list_id.into()),
            default_priority,
        }
    }
}

/// State written by one disposition application
#[derive(Debug, Clone)]
pub struct AttemptUpdate {
    pub status: ItemStatus,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub release_assignment: bool,
    pub code: String,
    pub at: DateTime<Utc>,
}

impl CallListItem {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let added_reason: String = row.try_get("added_reason")?;

        Ok(CallListItem {
            id: row.try_get("id")?,
            call_list_id: row.try_get("call_list_id")?,
            lead_id: row.try_get("lead_id")?,
            opportunity_id: row.try_get("opportunity_id")?,
            contact_id: row.try_get("contact_id")?,
            account_id: row.try_get("account_id")?,
            display_name: row.try_get("display_name")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
            record_status: row.try_get("record_status")?,
            status: ItemStatus::parse(&status)?,
            priority: row.try_get("priority")?,
            attempt_count: row.try_get("attempt_count")?,
            assigned_to_id: row.try_get("assigned_to_id")?,
            assigned_at: row.try_get("assigned_at")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            expires_at: row.try_get("expires_at")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            last_attempt_result: row.try_get("last_attempt_result")?,
            disposition: row.try_get("disposition")?,
            disposition_at: row.try_get("disposition_at")?,
            completed_at: row.try_get("completed_at")?,
            added_reason: AddedReason::from_db(&added_reason),
            source_list_id: row.try_get("source_list_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl DatabaseManager {
    pub async fn insert_item(&self, list_id: &str, new: &NewCallListItem, origin: &ItemOrigin) -> Result<CallListItem> {
        let mut conn = self.pool.acquire().await?;
        insert_item_with(&mut conn, list_id, new, origin).await
    }

    pub async fn get_item(&self, item_id: &str) -> Result<Option<CallListItem>> {
        let row = sqlx::query(&format!("SELECT {} FROM call_list_items WHERE id = ?", ITEM_COLUMNS))
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(CallListItem::from_row).transpose()
    }

    pub async fn require_item(&self, item_id: &str) -> Result<CallListItem> {
        self.get_item(item_id)
            .await?
            .ok_or_else(|| DialerError::not_found(format!("call list item {}", item_id)))
    }

    /// Items of a list in queue order, optionally narrowed to one status
    pub async fn list_items(&self, list_id: &str, status: Option<ItemStatus>, limit: i64) -> Result<Vec<CallListItem>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM call_list_items
                     WHERE call_list_id = ? AND status = ?
                     ORDER BY priority DESC, COALESCE(next_attempt_at, created_at) ASC, created_at ASC, id ASC
                     LIMIT ?",
                    ITEM_COLUMNS
                ))
                .bind(list_id)
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM call_list_items
                     WHERE call_list_id = ?
                     ORDER BY priority DESC, COALESCE(next_attempt_at, created_at) ASC, created_at ASC, id ASC
                     LIMIT ?",
                    ITEM_COLUMNS
                ))
                .bind(list_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(CallListItem::from_row).collect()
    }

    /// Record keys represented by non-terminal items of a list
    pub async fn active_record_keys(&self, list_id: &str) -> Result<HashSet<RecordKey>> {
        let rows = sqlx::query(
            "SELECT lead_id, opportunity_id FROM call_list_items
             WHERE call_list_id = ? AND status NOT IN ('COMPLETED', 'REMOVED')",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;

        let mut keys = HashSet::with_capacity(rows.len());
        for row in &rows {
            let lead_id: Option<String> = row.try_get("lead_id")?;
            let opportunity_id: Option<String> = row.try_get("opportunity_id")?;
            if let Some(key) = RecordKey::for_ids(lead_id.as_deref(), opportunity_id.as_deref()) {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    /// The non-terminal item of a list standing for `key`, if any
    pub async fn find_active_item_for_key(&self, list_id: &str, key: &RecordKey) -> Result<Option<CallListItem>> {
        let clause = match key.object {
            TargetObject::Opportunity => "opportunity_id = ?",
            TargetObject::Lead => "opportunity_id IS NULL AND lead_id = ?",
        };
        let row = sqlx::query(&format!(
            "SELECT {} FROM call_list_items
             WHERE call_list_id = ? AND status NOT IN ('COMPLETED', 'REMOVED') AND {}
             ORDER BY created_at ASC
             LIMIT 1",
            ITEM_COLUMNS, clause
        ))
        .bind(list_id)
        .bind(&key.id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(CallListItem::from_row).transpose()
    }

    /// Best eligible item for `agent_id` at `now`, without claiming it
    pub async fn next_candidate(&self, list_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let row = sqlx::query(&format!(
            "SELECT id FROM call_list_items
             WHERE call_list_id = ? AND {}
             ORDER BY priority DESC, COALESCE(next_attempt_at, created_at) ASC, created_at ASC, id ASC
             LIMIT 1",
            ELIGIBLE_PREDICATE
        ))
        .bind(list_id)
        .bind(agent_id)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get::<String, _>("id")).transpose().map_err(Into::into)
    }

    /// Compare-and-swap claim: succeeds only while the item is still eligible
    pub async fn try_claim_item(&self, item_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(&format!(
            "UPDATE call_list_items
             SET status = 'IN_PROGRESS', assigned_to_id = ?, assigned_at = ?, updated_at = ?
             WHERE id = ? AND {}",
            ELIGIBLE_PREDICATE
        ))
        .bind(agent_id)
        .bind(now)
        .bind(now)
        .bind(item_id)
        .bind(agent_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let claimed = result.rows_affected() == 1;
        if claimed {
            debug!("Item {} claimed by agent {}", item_id, agent_id);
        }
        Ok(claimed)
    }

    /// Return an in-progress item held by `agent_id` to the queue untouched
    pub async fn release_item(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        let result = sqlx::query(
            "UPDATE call_list_items
             SET status = 'PENDING', assigned_to_id = NULL, assigned_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'IN_PROGRESS' AND assigned_to_id = ?",
        )
        .bind(Utc::now())
        .bind(item_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        self.held_item_result(result.rows_affected(), item_id, agent_id).await
    }

    /// Park an in-progress item held by `agent_id` as SKIPPED
    pub async fn skip_item(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        let result = sqlx::query(
            "UPDATE call_list_items
             SET status = 'SKIPPED', updated_at = ?
             WHERE id = ? AND status = 'IN_PROGRESS' AND assigned_to_id = ?",
        )
        .bind(Utc::now())
        .bind(item_id)
        .bind(agent_id)
        .execute(&self.pool)
        .await?;

        self.held_item_result(result.rows_affected(), item_id, agent_id).await
    }

    async fn held_item_result(&self, affected: u64, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        let item = self.require_item(item_id).await?;
        if affected == 0 {
            return Err(DialerError::validation(format!(
                "item {} is {} and not held by agent {}",
                item_id, item.status, agent_id
            )));
        }
        Ok(item)
    }

    /// Pin a queued item to one agent
    pub async fn assign_item(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE call_list_items
             SET assigned_to_id = ?, assigned_at = ?, updated_at = ?
             WHERE id = ? AND status IN ('PENDING', 'RESCHEDULED')",
        )
        .bind(agent_id)
        .bind(now)
        .bind(now)
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        let item = self.require_item(item_id).await?;
        if result.rows_affected() == 0 {
            return Err(DialerError::validation(format!(
                "item {} is {} and cannot be assigned",
                item_id, item.status
            )));
        }
        info!("👤 Item {} assigned to agent {}", item_id, agent_id);
        Ok(item)
    }

    /// Mark a non-terminal item REMOVED
    pub async fn remove_item(&self, item_id: &str) -> Result<CallListItem> {
        let mut conn = self.pool.acquire().await?;
        let affected = mark_removed_with(&mut conn, item_id, Utc::now()).await?;
        drop(conn);

        let item = self.require_item(item_id).await?;
        if affected == 0 && item.status != ItemStatus::Removed {
            return Err(DialerError::validation(format!(
                "item {} is {} and cannot be removed",
                item_id, item.status
            )));
        }
        Ok(item)
    }
}

pub(crate) async fn insert_item_with(
    conn: &mut SqliteConnection,
    list_id: &str,
    new: &NewCallListItem,
    origin: &ItemOrigin,
) -> Result<CallListItem> {
    new.validate()?;

    let now = Utc::now();
    let id = new_id();
    let priority = new.priority.unwrap_or(origin.default_priority);
    let added_reason = origin.reason.as_db();

    sqlx::query(
        "INSERT INTO call_list_items (id, call_list_id, lead_id, opportunity_id, contact_id, account_id,
            display_name, phone, address, record_status, status, priority, attempt_count,
            assigned_to_id, assigned_at, next_attempt_at, expires_at, added_reason, source_list_id,
            created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?, 0, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(list_id)
    .bind(&new.lead_id)
    .bind(&new.opportunity_id)
    .bind(&new.contact_id)
    .bind(&new.account_id)
    .bind(&new.display_name)
    .bind(&new.phone)
    .bind(&new.address)
    .bind(&new.record_status)
    .bind(priority)
    .bind(&new.assigned_to_id)
    .bind(new.assigned_to_id.as_ref().map(|_| now))
    .bind(new.next_attempt_at)
    .bind(new.expires_at)
    .bind(&added_reason)
    .bind(&origin.source_list_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!("Item {} added to list {} ({})", id, list_id, added_reason);

    Ok(CallListItem {
        id,
        call_list_id: list_id.to_string(),
        lead_id: new.lead_id.clone(),
        opportunity_id: new.opportunity_id.clone(),
        contact_id: new.contact_id.clone(),
        account_id: new.account_id.clone(),
        display_name: new.display_name.clone(),
        phone: new.phone.clone(),
        address: new.address.clone(),
        record_status: new.record_status.clone(),
        status: ItemStatus::Pending,
        priority,
        attempt_count: 0,
        assigned_to_id: new.assigned_to_id.clone(),
        assigned_at: new.assigned_to_id.as_ref().map(|_| now),
        next_attempt_at: new.next_attempt_at,
        expires_at: new.expires_at,
        last_attempt_at: None,
        last_attempt_result: None,
        disposition: None,
        disposition_at: None,
        completed_at: None,
        added_reason: origin.reason.clone(),
        source_list_id: origin.source_list_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Write one attempt's bookkeeping unless the item is already terminal
pub(crate) async fn record_attempt_with(
    conn: &mut SqliteConnection,
    item_id: &str,
    update: &AttemptUpdate,
) -> Result<u64> {
    let completed_at = (update.status == ItemStatus::Completed).then_some(update.at);

    let result = sqlx::query(
        "UPDATE call_list_items SET
            status = ?,
            attempt_count = attempt_count + 1,
            next_attempt_at = ?,
            last_attempt_at = ?,
            last_attempt_result = ?,
            disposition = ?,
            disposition_at = ?,
            completed_at = COALESCE(?, completed_at),
            assigned_to_id = CASE WHEN ? THEN NULL ELSE assigned_to_id END,
            assigned_at = CASE WHEN ? THEN NULL ELSE assigned_at END,
            updated_at = ?
         WHERE id = ? AND status NOT IN ('COMPLETED', 'REMOVED')",
    )
    .bind(update.status.as_str())
    .bind(update.next_attempt_at)
    .bind(update.at)
    .bind(&update.code)
    .bind(&update.code)
    .bind(update.at)
    .bind(completed_at)
    .bind(update.release_assignment)
    .bind(update.release_assignment)
    .bind(update.at)
    .bind(item_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Fold a moved item's schedule into the target's existing item for the record
///
/// Keeps the earlier of the two next-attempt times (unset means due now) and
/// takes over `assigned_to_id` when given. A skipped item is queued again; an
/// item currently being dialed is left untouched.
pub(crate) async fn merge_moved_into_with(
    conn: &mut SqliteConnection,
    existing: &CallListItem,
    next_attempt_at: Option<DateTime<Utc>>,
    assigned_to_id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<u64> {
    let merged_next = match (existing.next_attempt_at, next_attempt_at) {
        (Some(current), Some(requested)) => Some(current.min(requested)),
        _ => None,
    };

    let result = sqlx::query(
        "UPDATE call_list_items SET
            status = CASE WHEN status = 'SKIPPED' THEN 'PENDING' ELSE status END,
            next_attempt_at = ?,
            assigned_to_id = COALESCE(?, assigned_to_id),
            updated_at = ?
         WHERE id = ? AND status IN ('PENDING', 'RESCHEDULED', 'SKIPPED')",
    )
    .bind(merged_next)
    .bind(assigned_to_id)
    .bind(at)
    .bind(&existing.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn mark_removed_with(conn: &mut SqliteConnection, item_id: &str, at: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE call_list_items SET status = 'REMOVED', assigned_to_id = NULL, updated_at = ?
         WHERE id = ? AND status != 'REMOVED'",
    )
    .bind(at)
    .bind(item_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
