//! # Disposition Engine
//!
//! Applies an agent's outcome code to a call list item. Application happens
//! in two phases:
//!
//! 1. **Item transition** (one transaction): attempt bookkeeping, the next
//!    eligible time, the new status and the call log row. The `UPDATE` is
//!    guarded on the item not being terminal, so a completed or removed item
//!    is never rewritten.
//! 2. **Side effects** (after commit, in order): move to another list, lead
//!    status, opportunity stage, do-not-call. Each runs independently; a
//!    failure is logged and reported in [`DispositionOutcome::failures`]
//!    without touching the committed transition.
//!
//! An item being dialed only takes a disposition from the agent holding it;
//! a pending item can be dispositioned by anyone, which covers manual dials.
//!
//! ## Status rules
//!
//! | disposition flag      | status        | next attempt                        | assignment |
//! |-----------------------|---------------|-------------------------------------|------------|
//! | `remove_from_list`    | `COMPLETED`   | none                                | kept       |
//! | `schedule_callback`   | `RESCHEDULED` | `callback_at`, else list cadence    | kept       |
//! | neither               | `PENDING`     | now + list cadence, else none       | released   |

pub mod catalog;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

pub use catalog::DispositionCatalog;

use crate::database::call_log_store::insert_call_log_with;
use crate::database::item_store::{
    insert_item_with, mark_removed_with, merge_moved_into_with, record_attempt_with, AttemptUpdate, ItemOrigin,
};
use crate::database::DatabaseManager;
use crate::dnc::{DncEntry, DncRegistry};
use crate::error::{DialerError, Result};
use crate::record_source::{RecordSource, STAGE_FIELD, STATUS_FIELD};
use crate::rules::RuleStore;
use crate::types::{new_id, CallList, CallListDisposition, CallListItem, CallLog, ItemStatus, NewCallListItem, TargetObject};

/// An agent's outcome for one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionRequest {
    pub item_id: String,
    pub code: String,
    pub agent_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Explicit callback time, honored by callback dispositions
    #[serde(default)]
    pub callback_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub call_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub talk_time_ms: Option<i64>,
}

impl DispositionRequest {
    pub fn new(item_id: impl Into<String>, code: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            code: code.into(),
            agent_id: agent_id.into(),
            notes: None,
            callback_at: None,
            call_started_at: None,
            talk_time_ms: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_callback_at(mut self, at: DateTime<Utc>) -> Self {
        self.callback_at = Some(at);
        self
    }
}

/// Something the disposition did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispositionAction {
    Completed,
    Rescheduled { next_attempt_at: Option<DateTime<Utc>> },
    Requeued { next_attempt_at: Option<DateTime<Utc>> },
    /// `merged` when the target list already held the record and `item_id`
    /// names that existing item
    Moved { target_list_id: String, item_id: String, merged: bool },
    LeadStatusUpdated { status: String },
    OpportunityStageUpdated { stage: String },
    AddedToDnc,
}

/// A side effect that did not happen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffectFailure {
    pub effect: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispositionOutcome {
    /// The item as committed by the transition, before any move
    pub item: CallListItem,
    pub call_log_id: String,
    pub actions: Vec<DispositionAction>,
    pub failures: Vec<SideEffectFailure>,
}

#[derive(Clone)]
pub struct DispositionEngine {
    db: DatabaseManager,
    rules: RuleStore,
    records: Arc<dyn RecordSource>,
    dnc: Arc<dyn DncRegistry>,
}

impl DispositionEngine {
    pub fn new(db: DatabaseManager, records: Arc<dyn RecordSource>, dnc: Arc<dyn DncRegistry>) -> Self {
        Self {
            rules: RuleStore::new(db.clone()),
            db,
            records,
            dnc,
        }
    }

    pub async fn apply(&self, item_id: &str, code: &str, notes: Option<&str>, agent_id: &str) -> Result<DispositionOutcome> {
        let mut request = DispositionRequest::new(item_id, code, agent_id);
        request.notes = notes.map(str::to_string);
        self.apply_request(&request).await
    }

    pub async fn apply_request(&self, request: &DispositionRequest) -> Result<DispositionOutcome> {
        let now = Utc::now();
        let item = self.db.require_item(&request.item_id).await?;
        let list = self.db.require_call_list(&item.call_list_id).await?;

        let catalog = self.rules.disposition_catalog(Some(&list.id)).await?;
        let disposition = catalog.resolve(&request.code).cloned().ok_or_else(|| {
            DialerError::not_found(format!("disposition '{}' for list {}", request.code, list.id))
        })?;

        if item.status.is_terminal() {
            return Err(DialerError::validation(format!(
                "item {} is already {}",
                item.id, item.status
            )));
        }
        if let Some(holder) = item.assigned_to_id.as_deref().filter(|_| item.status == ItemStatus::InProgress) {
            if holder != request.agent_id {
                return Err(DialerError::validation(format!(
                    "item {} is being dialed by {}, not {}",
                    item.id, holder, request.agent_id
                )));
            }
        }

        let (update, primary) = plan_transition(&list, &disposition, request.callback_at, now);
        let call_log = CallLog {
            id: new_id(),
            call_list_id: list.id.clone(),
            item_id: item.id.clone(),
            lead_id: item.lead_id.clone(),
            opportunity_id: item.opportunity_id.clone(),
            contact_id: item.contact_id.clone(),
            agent_id: request.agent_id.clone(),
            outcome: disposition.code.clone(),
            disposition_id: Some(disposition.id.clone()),
            notes: request.notes.clone(),
            phone: item.phone.clone(),
            call_started_at: request.call_started_at,
            talk_time_ms: request.talk_time_ms,
            logged_at: now,
        };

        let mut tx = self.db.begin_transaction().await?;
        if record_attempt_with(&mut tx, &item.id, &update).await? == 0 {
            tx.rollback().await?;
            return Err(DialerError::validation(format!(
                "item {} became terminal before the disposition was applied",
                item.id
            )));
        }
        insert_call_log_with(&mut tx, &call_log).await?;
        tx.commit().await?;

        info!(
            "🏷️ Disposition {} applied to item {} by {} → {}",
            disposition.code, item.id, request.agent_id, update.status
        );

        let committed = self.db.require_item(&item.id).await?;
        let mut outcome = DispositionOutcome {
            item: committed,
            call_log_id: call_log.id,
            actions: vec![primary],
            failures: Vec::new(),
        };

        self.run_side_effects(&disposition, &mut outcome, update.next_attempt_at, now)
            .await;

        if let Err(e) = self.db.update_list_counts(&list.id, None).await {
            warn!("⚠️ Failed to refresh counts for list {}: {}", list.id, e);
        }

        Ok(outcome)
    }

    async fn run_side_effects(
        &self,
        disposition: &CallListDisposition,
        outcome: &mut DispositionOutcome,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let item = outcome.item.clone();

        if disposition.move_to_list_id.is_some() || disposition.move_to_list_name.is_some() {
            let callback = disposition.schedule_callback.then_some(next_attempt_at).flatten();
            match self.move_for_disposition(&item, disposition, callback, now).await {
                Ok(action) => outcome.actions.push(action),
                Err(e) => record_failure(outcome, "move_to_list", &item, e),
            }
        }

        if let Some(status) = &disposition.update_lead_status {
            match &item.lead_id {
                Some(lead_id) => match self
                    .records
                    .update_field(TargetObject::Lead, lead_id, STATUS_FIELD, Value::String(status.clone()))
                    .await
                {
                    Ok(()) => outcome.actions.push(DispositionAction::LeadStatusUpdated { status: status.clone() }),
                    Err(e) => record_failure(outcome, "update_lead_status", &item, e),
                },
                None => debug!("Item {} has no lead, lead status update skipped", item.id),
            }
        }

        if let Some(stage) = &disposition.update_opp_stage {
            match &item.opportunity_id {
                Some(opportunity_id) => match self
                    .records
                    .update_field(TargetObject::Opportunity, opportunity_id, STAGE_FIELD, Value::String(stage.clone()))
                    .await
                {
                    Ok(()) => outcome
                        .actions
                        .push(DispositionAction::OpportunityStageUpdated { stage: stage.clone() }),
                    Err(e) => record_failure(outcome, "update_opp_stage", &item, e),
                },
                None => debug!("Item {} has no opportunity, stage update skipped", item.id),
            }
        }

        if disposition.add_to_dnc {
            let entry = DncEntry {
                lead_id: item.lead_id.clone(),
                opportunity_id: item.opportunity_id.clone(),
                contact_id: item.contact_id.clone(),
                phone: item.phone.clone(),
            };
            match self.dnc.add(&entry).await {
                Ok(()) => outcome.actions.push(DispositionAction::AddedToDnc),
                Err(e) => record_failure(outcome, "add_to_dnc", &item, e),
            }
        }
    }

    async fn move_for_disposition(
        &self,
        item: &CallListItem,
        disposition: &CallListDisposition,
        callback_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DispositionAction> {
        let target = match (&disposition.move_to_list_id, &disposition.move_to_list_name) {
            (Some(id), _) => self.db.require_call_list(id).await?,
            (None, Some(name)) => self
                .db
                .find_call_list_by_name(name)
                .await?
                .ok_or_else(|| DialerError::not_found(format!("call list named '{}'", name)))?,
            (None, None) => return Err(DialerError::internal("disposition has no move target")),
        };

        let assignee = callback_at.and(item.assigned_to_id.clone());
        let moved = move_item(&self.db, item, &target, callback_at, assignee, now).await?;
        Ok(DispositionAction::Moved {
            target_list_id: target.id,
            item_id: moved.item_id,
            merged: moved.merged,
        })
    }
}

/// Status, next attempt and assignment for one disposition
fn plan_transition(
    list: &CallList,
    disposition: &CallListDisposition,
    callback_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (AttemptUpdate, DispositionAction) {
    let cadence_next = list.cadence_hours.map(|h| now + Duration::hours(i64::from(h)));

    let (status, next_attempt_at, action) = if disposition.remove_from_list {
        (ItemStatus::Completed, None, DispositionAction::Completed)
    } else if disposition.schedule_callback {
        let at = callback_at.or(cadence_next);
        (ItemStatus::Rescheduled, at, DispositionAction::Rescheduled { next_attempt_at: at })
    } else {
        (ItemStatus::Pending, cadence_next, DispositionAction::Requeued { next_attempt_at: cadence_next })
    };

    let update = AttemptUpdate {
        status,
        next_attempt_at,
        release_assignment: status == ItemStatus::Pending,
        code: disposition.code.clone(),
        at: now,
    };
    (update, action)
}

fn record_failure(outcome: &mut DispositionOutcome, effect: &str, item: &CallListItem, error: DialerError) {
    warn!("⚠️ Side effect {} failed for item {}: {}", effect, item.id, error);
    outcome.failures.push(SideEffectFailure {
        effect: effect.to_string(),
        error: error.to_string(),
    });
}

/// Where a moved record ended up in its target list
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MovedItem {
    pub item_id: String,
    pub merged: bool,
}

/// Move `item` into `target`: a new PENDING item there, the original REMOVED
///
/// Runs in its own transaction. When `target` already holds a non-terminal
/// item for the same record, the schedule and assignee are folded into that
/// item instead of inserting a second one.
pub(crate) async fn move_item(
    db: &DatabaseManager,
    item: &CallListItem,
    target: &CallList,
    next_attempt_at: Option<DateTime<Utc>>,
    assigned_to_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<MovedItem> {
    if target.id == item.call_list_id {
        return Err(DialerError::validation("cannot move an item into its own list"));
    }
    if !target.is_active {
        return Err(DialerError::validation(format!("target list {} is inactive", target.id)));
    }

    let existing = match item.record_key() {
        Some(key) => db.find_active_item_for_key(&target.id, &key).await?,
        None => None,
    };

    let mut tx = db.begin_transaction().await?;
    let moved = match &existing {
        Some(existing) => {
            let merged = merge_moved_into_with(&mut tx, existing, next_attempt_at, assigned_to_id.as_deref(), now).await?;
            if merged == 0 {
                warn!(
                    "⚠️ Item {} for the moved record is being dialed in list {}; schedule left as is",
                    existing.id, target.id
                );
            }
            MovedItem {
                item_id: existing.id.clone(),
                merged: true,
            }
        }
        None => {
            let copy = NewCallListItem {
                lead_id: item.lead_id.clone(),
                opportunity_id: item.opportunity_id.clone(),
                contact_id: item.contact_id.clone(),
                account_id: item.account_id.clone(),
                display_name: item.display_name.clone(),
                phone: item.phone.clone(),
                address: item.address.clone(),
                record_status: item.record_status.clone(),
                priority: None,
                assigned_to_id,
                next_attempt_at,
                expires_at: item.expires_at,
            };
            let origin = ItemOrigin::moved_from(item.call_list_id.clone(), target.priority);
            MovedItem {
                item_id: insert_item_with(&mut tx, &target.id, &copy, &origin).await?.id,
                merged: false,
            }
        }
    };
    mark_removed_with(&mut tx, &item.id, now).await?;
    tx.commit().await?;

    info!(
        "🔀 Moved item {} from list {} to list '{}' as {}",
        item.id, item.call_list_id, target.name, moved.item_id
    );

    for list_id in [item.call_list_id.as_str(), target.id.as_str()] {
        if let Err(e) = db.update_list_counts(list_id, None).await {
            warn!("⚠️ Failed to refresh counts for list {}: {}", list_id, e);
        }
    }

    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CadenceType, ListType};

    fn list(cadence_hours: Option<i32>) -> CallList {
        let now = Utc::now();
        CallList {
            id: "list".to_string(),
            name: "List".to_string(),
            description: None,
            list_type: ListType::Static,
            target_object: TargetObject::Lead,
            filter_criteria: None,
            cadence_type: CadenceType::Preview,
            cadence_hours,
            max_attempts: 6,
            cooldown_days: None,
            priority: 0,
            is_active: true,
            last_refreshed_at: None,
            total_count: 0,
            pending_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn disposition(remove: bool, callback: bool) -> CallListDisposition {
        CallListDisposition {
            id: "d".to_string(),
            call_list_id: None,
            code: "CODE".to_string(),
            name: "Code".to_string(),
            category: None,
            color: None,
            sort_order: 0,
            remove_from_list: remove,
            schedule_callback: callback,
            add_to_dnc: false,
            move_to_list_id: None,
            move_to_list_name: None,
            update_lead_status: None,
            update_opp_stage: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_removal_clears_next_attempt() {
        let now = Utc::now();
        let (update, action) = plan_transition(&list(Some(24)), &disposition(true, true), Some(now), now);
        assert_eq!(update.status, ItemStatus::Completed);
        assert_eq!(update.next_attempt_at, None);
        assert!(!update.release_assignment);
        assert_eq!(action, DispositionAction::Completed);
    }

    #[test]
    fn test_callback_prefers_explicit_time() {
        let now = Utc::now();
        let at = now + Duration::minutes(30);
        let (update, _) = plan_transition(&list(Some(24)), &disposition(false, true), Some(at), now);
        assert_eq!(update.status, ItemStatus::Rescheduled);
        assert_eq!(update.next_attempt_at, Some(at));
        assert!(!update.release_assignment);

        let (fallback, _) = plan_transition(&list(Some(24)), &disposition(false, true), None, now);
        assert_eq!(fallback.next_attempt_at, Some(now + Duration::hours(24)));
    }

    #[test]
    fn test_plain_outcome_requeues_on_cadence() {
        let now = Utc::now();
        let (update, _) = plan_transition(&list(Some(4)), &disposition(false, false), None, now);
        assert_eq!(update.status, ItemStatus::Pending);
        assert_eq!(update.next_attempt_at, Some(now + Duration::hours(4)));
        assert!(update.release_assignment);

        let (no_cadence, _) = plan_transition(&list(None), &disposition(false, false), None, now);
        assert_eq!(no_cadence.next_attempt_at, None);
    }
}
