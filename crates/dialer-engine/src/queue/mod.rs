//! # Queue Assignment Engine
//!
//! Hands each agent the next eligible item of a call list. Selection and
//! claiming are separate statements: a plain `SELECT` picks the best
//! candidate, then a conditional `UPDATE` restates the whole eligibility
//! predicate and flips the row to `IN_PROGRESS`. Two agents racing for the
//! same row both run the `UPDATE`, exactly one sees a row affected, and the
//! loser selects again.
//!
//! ## Selection order
//!
//! 1. `priority` descending
//! 2. `COALESCE(next_attempt_at, created_at)` ascending (longest waiting)
//! 3. `created_at` ascending, then `id` for a total order
//!
//! ## Contention
//!
//! A caller that loses `max_claim_retries` races in a row is told there is
//! nothing to dial, the same answer an empty list gives.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialer_engine::database::DatabaseManager;
//! use dialer_engine::queue::QueueAssignmentEngine;
//! use dialer_engine::record_source::InMemoryRecordSource;
//!
//! # async fn example(list_id: &str) -> dialer_engine::Result<()> {
//! let db = DatabaseManager::new_in_memory().await?;
//! let queue = QueueAssignmentEngine::new(db, Arc::new(InMemoryRecordSource::new()), 3);
//!
//! if let Some(item) = queue.get_next(list_id, "agent-007").await? {
//!     println!("📞 Dial {:?}", item.phone);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::database::DatabaseManager;
use crate::error::{DialerError, Result};
use crate::record_source::RecordSource;
use crate::types::CallListItem;

#[derive(Clone)]
pub struct QueueAssignmentEngine {
    db: DatabaseManager,
    records: Arc<dyn RecordSource>,
    max_claim_retries: u32,
}

impl QueueAssignmentEngine {
    pub fn new(db: DatabaseManager, records: Arc<dyn RecordSource>, max_claim_retries: u32) -> Self {
        Self {
            db,
            records,
            max_claim_retries: max_claim_retries.max(1),
        }
    }

    /// Claim the next eligible item of `list_id` for `agent_id`
    pub async fn get_next(&self, list_id: &str, agent_id: &str) -> Result<Option<CallListItem>> {
        self.get_next_at(list_id, agent_id, Utc::now()).await
    }

    /// [`get_next`](Self::get_next) evaluated at an explicit instant
    pub async fn get_next_at(&self, list_id: &str, agent_id: &str, now: DateTime<Utc>) -> Result<Option<CallListItem>> {
        let list = self.db.require_call_list(list_id).await?;
        if !list.is_active {
            debug!("List {} is inactive, nothing to assign", list_id);
            return Ok(None);
        }

        for attempt in 1..=self.max_claim_retries {
            let Some(candidate) = self.db.next_candidate(list_id, agent_id, now).await? else {
                debug!("No eligible items in list {} for agent {}", list_id, agent_id);
                return Ok(None);
            };

            if self.db.try_claim_item(&candidate, agent_id, now).await? {
                let item = self.db.require_item(&candidate).await?;
                info!(
                    "📞 Assigned item {} ({:?}) to agent {} from list '{}'",
                    item.id, item.display_name, agent_id, list.name
                );
                return Ok(Some(item));
            }

            debug!(
                "Lost claim race for item {} (attempt {}/{})",
                candidate, attempt, self.max_claim_retries
            );
        }

        warn!(
            "⚠️ Agent {} starved on list {} after {} claim attempts",
            agent_id, list_id, self.max_claim_retries
        );
        Ok(None)
    }

    /// Give an undialed item back to the queue without counting an attempt
    pub async fn release(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        let item = self.db.release_item(item_id, agent_id).await?;
        info!("↩️ Agent {} released item {}", agent_id, item_id);
        Ok(item)
    }

    /// Set an item aside without dialing it
    pub async fn skip(&self, item_id: &str, agent_id: &str) -> Result<CallListItem> {
        let item = self.db.skip_item(item_id, agent_id).await?;
        info!("⏭️ Agent {} skipped item {}", agent_id, item_id);
        Ok(item)
    }

    /// Pre-assign a queued item, optionally handing its record to the agent
    ///
    /// The assignment is kept when the owner sync fails; the failure is
    /// returned as `ExternalFailure`.
    pub async fn assign(&self, item_id: &str, agent_id: &str, sync_owner: bool) -> Result<CallListItem> {
        let item = self.db.assign_item(item_id, agent_id).await?;

        if sync_owner {
            let list = self.db.require_call_list(&item.call_list_id).await?;
            let (object, record_id) = item
                .record_ref(list.target_object)
                .ok_or_else(|| DialerError::internal(format!("item {} has no record reference", item.id)))?;

            self.records
                .update_owner(object, record_id, agent_id)
                .await
                .map_err(|e| {
                    warn!("⚠️ Owner sync failed for record {}: {}", record_id, e);
                    match e {
                        DialerError::ExternalFailure(_) => e,
                        other => DialerError::external(other.to_string()),
                    }
                })?;
        }

        Ok(item)
    }
}
