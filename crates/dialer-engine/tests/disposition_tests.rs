//! Disposition application: transitions, call logs, moves and side effects

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use common::{create_test_dialer, hours_ago, lead, static_list_with_leads, TestDialer};
use dialer_engine::prelude::*;

struct UnavailableDncRegistry;

#[async_trait]
impl DncRegistry for UnavailableDncRegistry {
    async fn add(&self, _entry: &DncEntry) -> dialer_engine::Result<()> {
        Err(DialerError::external("dnc registry unavailable"))
    }
}

async fn seeded_dialer() -> TestDialer {
    let dialer = create_test_dialer().await;
    dialer.engine.ensure_predefined_lists().await.unwrap();
    dialer.engine.ensure_predefined_dispositions().await.unwrap();
    dialer
}

/// Non-terminal items across every list that reference `lead_id`
async fn live_items_for(dialer: &TestDialer, lead_id: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM call_list_items
         WHERE lead_id = ? AND status NOT IN ('COMPLETED', 'REMOVED')",
    )
    .bind(lead_id)
    .fetch_one(dialer.engine.database().pool())
    .await
    .unwrap()
}

#[tokio::test]
async fn test_no_answer_requeues_on_cadence() {
    let dialer = seeded_dialer().await;
    let list = static_list_with_leads(&dialer, "Cadence", 1).await;
    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let before = Utc::now();
    let outcome = dialer
        .engine
        .apply_disposition(&item.id, "NO_ANSWER", Some("rang out"), "alice")
        .await
        .unwrap();

    assert_eq!(outcome.item.status, ItemStatus::Pending);
    assert_eq!(outcome.item.attempt_count, 1);
    assert_eq!(outcome.item.disposition.as_deref(), Some("NO_ANSWER"));
    assert!(outcome.item.assigned_to_id.is_none());
    let next = outcome.item.next_attempt_at.expect("cadence sets a retry time");
    assert!(next >= before + Duration::minutes(59));
    assert!(matches!(outcome.actions[0], DispositionAction::Requeued { .. }));
    assert!(outcome.failures.is_empty());

    let logs = dialer.engine.database().list_item_call_logs(&item.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, outcome.call_log_id);
    assert_eq!(logs[0].outcome, "NO_ANSWER");
    assert_eq!(logs[0].agent_id, "alice");
    assert_eq!(logs[0].notes.as_deref(), Some("rang out"));
}

#[tokio::test]
async fn test_completed_item_rejects_further_dispositions() {
    let dialer = seeded_dialer().await;
    let list = static_list_with_leads(&dialer, "Final", 1).await;
    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let outcome = dialer
        .engine
        .apply_disposition(&item.id, "NOT_INTERESTED", None, "alice")
        .await
        .unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Completed);
    assert!(outcome.item.completed_at.is_some());
    assert!(outcome.item.next_attempt_at.is_none());
    assert!(outcome
        .actions
        .contains(&DispositionAction::LeadStatusUpdated { status: "not_interested".to_string() }));

    let record = dialer.records.get(item.lead_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.fields["status"], "not_interested");

    let err = dialer
        .engine
        .apply_disposition(&item.id, "NO_ANSWER", None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));

    let unchanged = dialer.engine.get_item(&item.id).await.unwrap();
    assert_eq!(unchanged.attempt_count, 1);
    assert_eq!(unchanged.status, ItemStatus::Completed);
    let logs = dialer.engine.database().list_item_call_logs(&item.id).await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_unknown_code_changes_nothing() {
    let dialer = seeded_dialer().await;
    let list = static_list_with_leads(&dialer, "Unknown", 1).await;
    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let err = dialer
        .engine
        .apply_disposition(&item.id, "NOT_A_CODE", None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::NotFound(_)));

    let unchanged = dialer.engine.get_item(&item.id).await.unwrap();
    assert_eq!(unchanged.status, ItemStatus::InProgress);
    assert_eq!(unchanged.attempt_count, 0);
    assert!(dialer.engine.database().list_item_call_logs(&item.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_moves_item_with_schedule_and_agent() {
    let dialer = seeded_dialer().await;
    let reactivation = dialer
        .engine
        .rules()
        .find_list_by_name("Reactivation")
        .await
        .unwrap()
        .unwrap();
    let callbacks = dialer
        .engine
        .rules()
        .find_list_by_name("Callbacks")
        .await
        .unwrap()
        .unwrap();

    dialer.records.insert(lead("returning", Some("+15551230000"), hours_ago(100)));
    dialer
        .engine
        .add_records_to_list(&reactivation.id, &["returning".to_string()])
        .await
        .unwrap();
    let item = dialer
        .engine
        .get_next_call_item(&reactivation.id, "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live_items_for(&dialer, "returning").await, 1);

    let callback_at = Utc::now() + Duration::hours(3);
    let request = DispositionRequest::new(&item.id, "CALLBACK", "alice")
        .with_notes("call after lunch")
        .with_callback_at(callback_at);
    let outcome = dialer.engine.apply_disposition_request(&request).await.unwrap();

    assert!(matches!(
        outcome.actions[0],
        DispositionAction::Rescheduled { next_attempt_at: Some(_) }
    ));
    let new_item_id = outcome
        .actions
        .iter()
        .find_map(|a| match a {
            DispositionAction::Moved { target_list_id, item_id, merged } => {
                assert_eq!(target_list_id, &callbacks.id);
                assert!(!merged);
                Some(item_id.clone())
            }
            _ => None,
        })
        .expect("callback moves the item");

    let original = dialer.engine.get_item(&item.id).await.unwrap();
    assert_eq!(original.status, ItemStatus::Removed);

    let moved = dialer.engine.get_item(&new_item_id).await.unwrap();
    assert_eq!(moved.call_list_id, callbacks.id);
    assert_eq!(moved.status, ItemStatus::Pending);
    assert_eq!(moved.attempt_count, 0);
    assert_eq!(moved.assigned_to_id.as_deref(), Some("alice"));
    assert_eq!(moved.source_list_id.as_deref(), Some(reactivation.id.as_str()));
    assert_eq!(moved.added_reason, AddedReason::MovedFromList);
    let scheduled = moved.next_attempt_at.expect("callback time carried over");
    assert!((scheduled - callback_at).num_seconds().abs() < 1);

    assert_eq!(live_items_for(&dialer, "returning").await, 1);

    // Not due yet, and reserved for the agent who took the callback
    assert!(dialer.engine.get_next_call_item(&callbacks.id, "alice").await.unwrap().is_none());
    let later = callback_at + Duration::minutes(1);
    let queue = dialer.engine.queue();
    assert!(queue.get_next_at(&callbacks.id, "bob", later).await.unwrap().is_none());
    let due = queue.get_next_at(&callbacks.id, "alice", later).await.unwrap().unwrap();
    assert_eq!(due.id, new_item_id);
}

#[tokio::test]
async fn test_move_into_list_already_holding_record_merges_schedule() {
    let dialer = seeded_dialer().await;
    let callbacks = dialer
        .engine
        .rules()
        .find_list_by_name("Callbacks")
        .await
        .unwrap()
        .unwrap();
    let list = static_list_with_leads(&dialer, "Dupes", 1).await;
    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    let lead_id = item.lead_id.clone().unwrap();

    let existing = dialer
        .engine
        .add_records_to_list(&callbacks.id, &[lead_id.clone()])
        .await
        .unwrap()
        .added
        .remove(0);
    sqlx::query("UPDATE call_list_items SET next_attempt_at = ? WHERE id = ?")
        .bind(Utc::now() + Duration::days(1))
        .bind(&existing.id)
        .execute(dialer.engine.database().pool())
        .await
        .unwrap();
    assert_eq!(live_items_for(&dialer, &lead_id).await, 2);

    let callback_at = Utc::now() + Duration::hours(3);
    let request = DispositionRequest::new(&item.id, "CALLBACK", "alice").with_callback_at(callback_at);
    let outcome = dialer.engine.apply_disposition_request(&request).await.unwrap();
    assert!(outcome.actions.contains(&DispositionAction::Moved {
        target_list_id: callbacks.id.clone(),
        item_id: existing.id.clone(),
        merged: true,
    }));
    assert_eq!(live_items_for(&dialer, &lead_id).await, 1);

    let merged = dialer.engine.get_item(&existing.id).await.unwrap();
    assert_eq!(merged.status, ItemStatus::Pending);
    assert_eq!(merged.assigned_to_id.as_deref(), Some("alice"));
    let scheduled = merged.next_attempt_at.expect("earlier callback time kept");
    assert!((scheduled - callback_at).num_seconds().abs() < 1);
    assert_eq!(dialer.engine.get_item(&item.id).await.unwrap().status, ItemStatus::Removed);
}

#[tokio::test]
async fn test_callback_for_sibling_opportunity_gets_its_own_item() {
    let dialer = seeded_dialer().await;
    let callbacks = dialer
        .engine
        .rules()
        .find_list_by_name("Callbacks")
        .await
        .unwrap()
        .unwrap();
    let pipeline = dialer
        .engine
        .create_call_list(NewCallList::new("Pipeline", ListType::Static).with_target(TargetObject::Opportunity))
        .await
        .unwrap();

    for (id, phone) in [("opp-1", "+15554440001"), ("opp-2", "+15554440002")] {
        dialer.records.insert(SourceRecord::new(
            id,
            TargetObject::Opportunity,
            json!({ "name": id, "phone": phone, "lead_id": "lead-shared", "stage": "proposal" }),
        ));
    }
    let sibling = dialer
        .engine
        .add_items_to_list(
            &callbacks.id,
            vec![NewCallListItem {
                lead_id: Some("lead-shared".to_string()),
                opportunity_id: Some("opp-1".to_string()),
                phone: Some("+15554440001".to_string()),
                ..Default::default()
            }],
        )
        .await
        .unwrap()
        .added
        .remove(0);
    dialer
        .engine
        .add_records_to_list(&pipeline.id, &["opp-2".to_string()])
        .await
        .unwrap();
    let item = dialer.engine.get_next_call_item(&pipeline.id, "alice").await.unwrap().unwrap();
    assert_eq!(item.opportunity_id.as_deref(), Some("opp-2"));
    assert_eq!(item.lead_id.as_deref(), Some("lead-shared"));

    let callback_at = Utc::now() + Duration::hours(2);
    let request = DispositionRequest::new(&item.id, "CALLBACK", "alice").with_callback_at(callback_at);
    let outcome = dialer.engine.apply_disposition_request(&request).await.unwrap();

    let (moved_id, merged) = outcome
        .actions
        .iter()
        .find_map(|a| match a {
            DispositionAction::Moved { item_id, merged, .. } => Some((item_id.clone(), *merged)),
            _ => None,
        })
        .expect("callback moves the item");
    assert!(!merged);
    assert_ne!(moved_id, sibling.id);

    let moved = dialer.engine.get_item(&moved_id).await.unwrap();
    assert_eq!(moved.call_list_id, callbacks.id);
    assert_eq!(moved.opportunity_id.as_deref(), Some("opp-2"));
    assert_eq!(moved.assigned_to_id.as_deref(), Some("alice"));
    let scheduled = moved.next_attempt_at.expect("callback time carried over");
    assert!((scheduled - callback_at).num_seconds().abs() < 1);

    let untouched = dialer.engine.get_item(&sibling.id).await.unwrap();
    assert_eq!(untouched.status, ItemStatus::Pending);
    assert!(untouched.assigned_to_id.is_none());
    assert!(untouched.next_attempt_at.is_none());
}

#[tokio::test]
async fn test_only_the_dialing_agent_can_disposition_a_claimed_item() {
    let dialer = seeded_dialer().await;
    let list = static_list_with_leads(&dialer, "Owned", 2).await;
    let claimed = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let err = dialer
        .engine
        .apply_disposition(&claimed.id, "NO_ANSWER", None, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));

    let unchanged = dialer.engine.get_item(&claimed.id).await.unwrap();
    assert_eq!(unchanged.status, ItemStatus::InProgress);
    assert_eq!(unchanged.attempt_count, 0);
    assert!(dialer.engine.database().list_item_call_logs(&claimed.id).await.unwrap().is_empty());

    // A pending item takes a disposition from whoever dialed it by hand
    let pending = dialer
        .engine
        .list_items(&list.id, Some(ItemStatus::Pending), 10)
        .await
        .unwrap()
        .remove(0);
    let outcome = dialer
        .engine
        .apply_disposition(&pending.id, "NO_ANSWER", None, "bob")
        .await
        .unwrap();
    assert_eq!(outcome.item.attempt_count, 1);
}

#[tokio::test]
async fn test_side_effect_failure_keeps_committed_transition() {
    let db = DatabaseManager::new_in_memory().await.unwrap();
    let records = Arc::new(InMemoryRecordSource::new());
    let source: Arc<dyn RecordSource> = records.clone();
    let engine = DialerEngine::new(DialerConfig::default(), db, source, Arc::new(UnavailableDncRegistry));
    engine.ensure_predefined_dispositions().await.unwrap();

    records.insert(lead("angry", Some("+15559990000"), hours_ago(2)));
    let list = engine
        .create_call_list(NewCallList::new("Compliance", ListType::Static))
        .await
        .unwrap();
    engine.add_records_to_list(&list.id, &["angry".to_string()]).await.unwrap();
    let item = engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let outcome = engine
        .apply_disposition(&item.id, "DO_NOT_CALL", None, "alice")
        .await
        .unwrap();

    assert_eq!(outcome.item.status, ItemStatus::Completed);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].effect, "add_to_dnc");
    assert!(!outcome.actions.contains(&DispositionAction::AddedToDnc));
    assert!(outcome
        .actions
        .contains(&DispositionAction::LeadStatusUpdated { status: "do_not_call".to_string() }));

    let logs = engine.database().list_item_call_logs(&item.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(records.get("angry").unwrap().fields["status"], "do_not_call");
}

#[tokio::test]
async fn test_do_not_call_flags_the_record() {
    let dialer = seeded_dialer().await;
    let list = static_list_with_leads(&dialer, "Flag", 1).await;
    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let outcome = dialer
        .engine
        .apply_disposition(&item.id, "DO_NOT_CALL", None, "alice")
        .await
        .unwrap();
    assert!(outcome.actions.contains(&DispositionAction::AddedToDnc));

    let record = dialer.records.get(item.lead_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.fields["do_not_call"], true);
}

#[tokio::test]
async fn test_list_scoped_definition_shadows_global() {
    let dialer = seeded_dialer().await;
    let list = static_list_with_leads(&dialer, "Scoped", 2).await;

    let scoped = dialer
        .engine
        .rules()
        .create_disposition(&NewDisposition {
            call_list_id: Some(list.id.clone()),
            remove_from_list: true,
            ..NewDisposition::new("NO_ANSWER", "No Answer (final)")
        })
        .await
        .unwrap();

    let first = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    let outcome = dialer
        .engine
        .apply_disposition(&first.id, "NO_ANSWER", None, "alice")
        .await
        .unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Completed);

    dialer.engine.rules().deactivate_disposition(&scoped.id).await.unwrap();
    let second = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    let err = dialer
        .engine
        .apply_disposition(&second.id, "NO_ANSWER", None, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_code_in_same_scope_is_rejected() {
    let dialer = seeded_dialer().await;
    let err = dialer
        .engine
        .rules()
        .create_disposition(&NewDisposition::new("NO_ANSWER", "Again"))
        .await
        .unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));
}
