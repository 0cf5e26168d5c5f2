//! # Rule Store
//!
//! Administrator-facing accessors over call list and disposition
//! definitions, the merged disposition catalog, and the idempotent seed
//! routines. Seeds match existing lists by `name` and global dispositions by
//! `code`, so running them again inserts nothing.

pub mod seed;

use tracing::info;

use crate::config::QueueConfig;
use crate::database::DatabaseManager;
use crate::disposition::DispositionCatalog;
use crate::error::{DialerError, Result};
use crate::types::{CallList, CallListDisposition, NewDisposition};

#[derive(Clone)]
pub struct RuleStore {
    db: DatabaseManager,
}

impl RuleStore {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    pub async fn get_list(&self, list_id: &str) -> Result<CallList> {
        self.db.require_call_list(list_id).await
    }

    pub async fn list_lists(&self, active_only: bool) -> Result<Vec<CallList>> {
        self.db.list_call_lists(active_only).await
    }

    pub async fn find_list_by_name(&self, name: &str) -> Result<Option<CallList>> {
        self.db.find_call_list_by_name(name).await
    }

    pub async fn get_disposition(&self, disposition_id: &str) -> Result<CallListDisposition> {
        self.db
            .get_disposition(disposition_id)
            .await?
            .ok_or_else(|| DialerError::not_found(format!("disposition {}", disposition_id)))
    }

    pub async fn create_disposition(&self, new: &NewDisposition) -> Result<CallListDisposition> {
        self.db.insert_disposition(new).await
    }

    pub async fn deactivate_disposition(&self, disposition_id: &str) -> Result<()> {
        self.db.deactivate_disposition(disposition_id).await
    }

    /// Global tier plus the tier of `list_id`
    pub async fn disposition_catalog(&self, list_id: Option<&str>) -> Result<DispositionCatalog> {
        if let Some(list_id) = list_id {
            self.db.require_call_list(list_id).await?;
        }
        let definitions = self.db.list_dispositions(list_id, false).await?;
        Ok(DispositionCatalog::from_definitions(list_id, definitions))
    }

    /// Insert the predefined lists that are missing; returns how many were inserted
    pub async fn ensure_predefined_lists(&self, defaults: &QueueConfig) -> Result<usize> {
        let mut inserted = 0;
        for list in seed::predefined_lists() {
            if self.db.find_call_list_by_name(&list.name).await?.is_some() {
                continue;
            }
            if let Some(filter) = &list.filter_criteria {
                filter.validate()?;
            }
            let max_attempts = list.max_attempts.unwrap_or(defaults.default_max_attempts);
            let cadence_hours = list.cadence_hours.or(defaults.default_cadence_hours);
            self.db.insert_call_list(&list, max_attempts, cadence_hours).await?;
            inserted += 1;
        }

        info!("🌱 Predefined lists ensured ({} inserted)", inserted);
        Ok(inserted)
    }

    /// Insert the predefined global dispositions that are missing
    pub async fn ensure_predefined_dispositions(&self) -> Result<usize> {
        let mut inserted = 0;
        for disposition in seed::predefined_dispositions() {
            if self.db.find_global_disposition(&disposition.code).await?.is_some() {
                continue;
            }
            self.db.insert_disposition(&disposition).await?;
            inserted += 1;
        }

        info!("🌱 Predefined dispositions ensured ({} inserted)", inserted);
        Ok(inserted)
    }
}
