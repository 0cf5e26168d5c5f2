//! # List Population Engine
//!
//! Turns a dynamic list's filter into queue items and wraps the manual list
//! and item CRUD operations around the same item model.
//!
//! ## Refresh
//!
//! 1. Resolve the list's relative-time leaves against the current instant
//! 2. Ask the [`RecordSource`] for matching records of the list's target kind
//! 3. Skip records already represented by a non-terminal item of the list
//! 4. Enqueue the rest that carry a phone number, snapshotting display fields
//! 5. Stamp `last_refreshed_at` and the cached counts
//!
//! Refreshes of the same list are serialized in-process through a per-list
//! mutex, so two overlapping refreshes cannot both enqueue the same record.
//! Refresh only ever inserts `PENDING` rows, so it can run alongside
//! assignment without further locking.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{PopulationConfig, QueueConfig};
use crate::database::item_store::{insert_item_with, ItemOrigin};
use crate::database::DatabaseManager;
use crate::disposition::move_item;
use crate::error::{DialerError, Result};
use crate::record_source::{RecordSource, SourceRecord};
use crate::types::{
    AddedReason, CallList, CallListItem, ListType, NewCallList, NewCallListItem, RecordKey, TargetObject,
};

/// What one refresh did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub list_id: String,
    /// Items enqueued by this refresh
    pub added: usize,
    /// Non-terminal items in the list afterwards
    pub total: i64,
    /// Records the filter matched
    pub matched: usize,
    pub skipped_existing: usize,
    pub skipped_no_phone: usize,
    pub refreshed_at: DateTime<Utc>,
}

/// What one manual add did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddItemsResult {
    pub added: Vec<CallListItem>,
    pub skipped_existing: usize,
    pub skipped_no_phone: usize,
    /// Requested record ids the record source does not know
    pub not_found: Vec<String>,
}

#[derive(Clone)]
pub struct ListPopulationEngine {
    db: DatabaseManager,
    records: Arc<dyn RecordSource>,
    phone_fields: Vec<String>,
    default_max_attempts: i32,
    default_cadence_hours: Option<i32>,
    refresh_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ListPopulationEngine {
    pub fn new(
        db: DatabaseManager,
        records: Arc<dyn RecordSource>,
        population: &PopulationConfig,
        queue: &QueueConfig,
    ) -> Self {
        Self {
            db,
            records,
            phone_fields: population.phone_fields.clone(),
            default_max_attempts: queue.default_max_attempts,
            default_cadence_hours: queue.default_cadence_hours,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    /// Validate and persist a new list, filling in configured defaults
    pub async fn create_call_list(&self, new: NewCallList) -> Result<CallList> {
        if new.name.trim().is_empty() {
            return Err(DialerError::validation("call list name cannot be empty"));
        }
        match (&new.list_type, &new.filter_criteria) {
            (ListType::Dynamic, None) => {
                return Err(DialerError::validation("dynamic lists require filter criteria"));
            }
            (_, Some(filter)) => filter.validate()?,
            _ => {}
        }

        let max_attempts = new.max_attempts.unwrap_or(self.default_max_attempts);
        if max_attempts <= 0 {
            return Err(DialerError::validation("max_attempts must be greater than 0"));
        }
        let cadence_hours = new.cadence_hours.or(self.default_cadence_hours);
        if cadence_hours.map_or(false, |h| h <= 0) {
            return Err(DialerError::validation("cadence_hours must be positive"));
        }
        if new.cooldown_days.map_or(false, |d| d < 0) {
            return Err(DialerError::validation("cooldown_days cannot be negative"));
        }

        self.db.insert_call_list(&new, max_attempts, cadence_hours).await
    }

    pub async fn deactivate_list(&self, list_id: &str) -> Result<()> {
        self.db.deactivate_call_list(list_id).await
    }

    fn refresh_lock(&self, list_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(list_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Re-evaluate a dynamic list's filter and enqueue new matches
    pub async fn refresh(&self, list_id: &str) -> Result<RefreshResult> {
        self.refresh_at(list_id, Utc::now()).await
    }

    /// [`refresh`](Self::refresh) with relative times resolved against `now`
    pub async fn refresh_at(&self, list_id: &str, now: DateTime<Utc>) -> Result<RefreshResult> {
        let list = self.db.require_call_list(list_id).await?;
        if list.list_type != ListType::Dynamic {
            return Err(DialerError::validation(format!(
                "list {} is {}, only DYNAMIC lists are refreshed",
                list_id, list.list_type
            )));
        }
        let filter = list
            .filter_criteria
            .as_ref()
            .ok_or_else(|| DialerError::validation(format!("dynamic list {} has no filter criteria", list_id)))?;

        let lock = self.refresh_lock(list_id);
        let _guard = lock.lock().await;

        let resolved = filter.resolve(now);
        let matches = self.records.query_records(list.target_object, &resolved).await?;
        debug!("Filter for list {} matched {} records", list_id, matches.len());

        let mut present = self.db.active_record_keys(list_id).await?;
        let origin = ItemOrigin::new(AddedReason::DynamicRefresh, list.priority);
        let mut added = 0;
        let mut skipped_existing = 0;
        let mut skipped_no_phone = 0;

        let mut tx = self.db.begin_transaction().await?;
        for record in &matches {
            let key = RecordKey::new(list.target_object, record.id.clone());
            if present.contains(&key) {
                skipped_existing += 1;
                continue;
            }
            let Some(new_item) = self.item_from_record(record) else {
                skipped_no_phone += 1;
                continue;
            };
            insert_item_with(&mut tx, list_id, &new_item, &origin).await?;
            present.insert(key);
            added += 1;
        }
        tx.commit().await?;

        let (total, _pending) = self.db.update_list_counts(list_id, Some(now)).await?;

        info!(
            "🔄 Refreshed list '{}': {} added, {} already queued, {} without phone ({} total)",
            list.name, added, skipped_existing, skipped_no_phone, total
        );

        Ok(RefreshResult {
            list_id: list_id.to_string(),
            added,
            total,
            matched: matches.len(),
            skipped_existing,
            skipped_no_phone,
            refreshed_at: now,
        })
    }

    /// Refresh every active dynamic list; one list failing does not stop the rest
    pub async fn refresh_all_dynamic(&self) -> Result<Vec<RefreshResult>> {
        let lists = self.db.list_dynamic_lists().await?;
        let mut results = Vec::with_capacity(lists.len());
        for list in lists {
            match self.refresh(&list.id).await {
                Ok(result) => results.push(result),
                Err(e) => warn!("⚠️ Refresh of list '{}' failed: {}", list.name, e),
            }
        }
        Ok(results)
    }

    /// Enqueue source records by id
    pub async fn add_records_to_list(&self, list_id: &str, record_ids: &[String]) -> Result<AddItemsResult> {
        let list = self.db.require_call_list(list_id).await?;
        let mut present = self.db.active_record_keys(list_id).await?;
        let mut result = AddItemsResult::default();
        let mut pending = Vec::new();

        for record_id in record_ids {
            if present.contains(&RecordKey::new(list.target_object, record_id.clone())) {
                result.skipped_existing += 1;
                continue;
            }
            let Some(record) = self.records.get_record(list.target_object, record_id).await? else {
                result.not_found.push(record_id.clone());
                continue;
            };
            match self.item_from_record(&record) {
                Some(new_item) => {
                    present.insert(RecordKey::new(list.target_object, record.id.clone()));
                    pending.push(new_item);
                }
                None => result.skipped_no_phone += 1,
            }
        }

        result.added = self.insert_manual(&list, &pending).await?;
        Ok(result)
    }

    /// Enqueue explicitly described items; each must reference a record and carry a phone
    pub async fn add_items_to_list(&self, list_id: &str, items: Vec<NewCallListItem>) -> Result<AddItemsResult> {
        let list = self.db.require_call_list(list_id).await?;
        for item in &items {
            item.validate()?;
        }

        let mut present: HashSet<RecordKey> = self.db.active_record_keys(list_id).await?;
        let mut result = AddItemsResult::default();
        let mut pending = Vec::with_capacity(items.len());

        for item in items {
            let Some(key) = item.record_key() else {
                continue;
            };
            if !present.insert(key) {
                result.skipped_existing += 1;
                continue;
            }
            pending.push(item);
        }

        result.added = self.insert_manual(&list, &pending).await?;
        Ok(result)
    }

    async fn insert_manual(&self, list: &CallList, items: &[NewCallListItem]) -> Result<Vec<CallListItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let origin = ItemOrigin::new(AddedReason::Manual, list.priority);
        let mut added = Vec::with_capacity(items.len());
        let mut tx = self.db.begin_transaction().await?;
        for item in items {
            added.push(insert_item_with(&mut tx, &list.id, item, &origin).await?);
        }
        tx.commit().await?;

        self.db.update_list_counts(&list.id, None).await?;
        info!("➕ Added {} items to list '{}'", added.len(), list.name);
        Ok(added)
    }

    pub async fn remove_item_from_list(&self, item_id: &str) -> Result<CallListItem> {
        let item = self.db.remove_item(item_id).await?;
        self.db.update_list_counts(&item.call_list_id, None).await?;
        info!("➖ Removed item {} from list {}", item_id, item.call_list_id);
        Ok(item)
    }

    /// Move a live item to another list; returns the item now standing for
    /// the record in `target_list_id`
    pub async fn move_item_to_list(&self, item_id: &str, target_list_id: &str) -> Result<CallListItem> {
        let item = self.db.require_item(item_id).await?;
        if item.status.is_terminal() {
            return Err(DialerError::validation(format!("item {} is already {}", item_id, item.status)));
        }
        let target = self.db.require_call_list(target_list_id).await?;

        let moved = move_item(&self.db, &item, &target, None, None, Utc::now()).await?;
        self.db.require_item(&moved.item_id).await
    }

    /// Snapshot a record into item input, or `None` without a usable phone
    fn item_from_record(&self, record: &SourceRecord) -> Option<NewCallListItem> {
        let phone = record.phone(&self.phone_fields)?;
        let (lead_id, opportunity_id) = match record.object {
            TargetObject::Lead => (Some(record.id.clone()), None),
            TargetObject::Opportunity => (record.lead_id(), Some(record.id.clone())),
        };

        Some(NewCallListItem {
            lead_id,
            opportunity_id,
            contact_id: record.contact_id(),
            account_id: record.account_id(),
            display_name: record.display_name(),
            phone: Some(phone),
            address: record.address(),
            record_status: record.record_status(),
            ..Default::default()
        })
    }
}
