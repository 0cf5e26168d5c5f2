//! Queue assignment: exclusivity, eligibility windows and attempt caps

mod common;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use futures::future::join_all;

use common::{create_test_dialer, static_list_with_leads};
use dialer_engine::prelude::*;

#[tokio::test]
async fn test_concurrent_agents_never_share_an_item() {
    let dialer = create_test_dialer().await;
    let list = static_list_with_leads(&dialer, "Concurrent", 5).await;

    let requests = (0..8).map(|i| {
        let engine = dialer.engine.clone();
        let list_id = list.id.clone();
        async move { engine.get_next_call_item(&list_id, &format!("agent-{}", i)).await }
    });
    let results = join_all(requests).await;

    let mut claimed = Vec::new();
    for result in results {
        if let Some(item) = result.expect("get_next failed") {
            assert_eq!(item.status, ItemStatus::InProgress);
            claimed.push(item);
        }
    }

    let unique: HashSet<&str> = claimed.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(unique.len(), claimed.len(), "an item was handed out twice");
    assert!(claimed.len() <= 5);

    // Drain whatever the concurrent phase left behind
    let mut drained = claimed.len();
    while let Some(item) = dialer.engine.get_next_call_item(&list.id, "agent-drain").await.unwrap() {
        assert!(!unique.contains(item.id.as_str()));
        drained += 1;
    }
    assert_eq!(drained, 5);
    assert!(dialer.engine.get_next_call_item(&list.id, "agent-late").await.unwrap().is_none());
}

#[tokio::test]
async fn test_in_progress_item_is_not_reissued() {
    let dialer = create_test_dialer().await;
    let list = static_list_with_leads(&dialer, "Single", 1).await;

    let first = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    assert_eq!(first.assigned_to_id.as_deref(), Some("alice"));
    assert!(first.assigned_at.is_some());

    assert!(dialer.engine.get_next_call_item(&list.id, "bob").await.unwrap().is_none());
    assert!(dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_higher_priority_items_come_first() {
    let dialer = create_test_dialer().await;
    let list = dialer
        .engine
        .create_call_list(NewCallList::new("Priorities", ListType::Static))
        .await
        .unwrap();

    let items = vec![
        NewCallListItem {
            lead_id: Some("low".to_string()),
            phone: Some("+15550001".to_string()),
            priority: Some(1),
            ..Default::default()
        },
        NewCallListItem {
            lead_id: Some("high".to_string()),
            phone: Some("+15550002".to_string()),
            priority: Some(9),
            ..Default::default()
        },
    ];
    dialer.engine.add_items_to_list(&list.id, items).await.unwrap();

    let next = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    assert_eq!(next.lead_id.as_deref(), Some("high"));
}

#[tokio::test]
async fn test_future_next_attempt_is_held_back() {
    let dialer = create_test_dialer().await;
    let list = dialer
        .engine
        .create_call_list(NewCallList::new("Scheduled", ListType::Static))
        .await
        .unwrap();

    let later = Utc::now() + Duration::hours(2);
    dialer
        .engine
        .add_items_to_list(
            &list.id,
            vec![NewCallListItem {
                lead_id: Some("later".to_string()),
                phone: Some("+15550003".to_string()),
                next_attempt_at: Some(later),
                ..Default::default()
            }],
        )
        .await
        .unwrap();

    let queue = dialer.engine.queue();
    assert!(queue.get_next(&list.id, "alice").await.unwrap().is_none());
    let item = queue
        .get_next_at(&list.id, "alice", later + Duration::minutes(1))
        .await
        .unwrap()
        .expect("item due after its next attempt time");
    assert_eq!(item.lead_id.as_deref(), Some("later"));
}

#[tokio::test]
async fn test_expired_item_is_never_assigned() {
    let dialer = create_test_dialer().await;
    let list = dialer
        .engine
        .create_call_list(NewCallList::new("Expiring", ListType::Static))
        .await
        .unwrap();

    dialer
        .engine
        .add_items_to_list(
            &list.id,
            vec![NewCallListItem {
                lead_id: Some("expired".to_string()),
                phone: Some("+15550004".to_string()),
                expires_at: Some(Utc::now() - Duration::minutes(5)),
                ..Default::default()
            }],
        )
        .await
        .unwrap();

    assert!(dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_final_attempt_exhausts_the_item() {
    let dialer = create_test_dialer().await;
    dialer.engine.ensure_predefined_dispositions().await.unwrap();
    let list = dialer
        .engine
        .create_call_list(
            NewCallList::new("Six Tries", ListType::Static)
                .with_max_attempts(6)
                .with_cadence_hours(1),
        )
        .await
        .unwrap();
    let added = dialer
        .engine
        .add_items_to_list(
            &list.id,
            vec![NewCallListItem {
                lead_id: Some("persistent".to_string()),
                phone: Some("+15550005".to_string()),
                ..Default::default()
            }],
        )
        .await
        .unwrap();
    let item_id = added.added[0].id.clone();

    sqlx::query("UPDATE call_list_items SET attempt_count = 5 WHERE id = ?")
        .bind(&item_id)
        .execute(dialer.engine.database().pool())
        .await
        .unwrap();

    let claimed = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    assert_eq!(claimed.id, item_id);

    let outcome = dialer
        .engine
        .apply_disposition(&item_id, "NO_ANSWER", None, "alice")
        .await
        .unwrap();
    assert_eq!(outcome.item.attempt_count, 6);
    assert_eq!(outcome.item.status, ItemStatus::Pending);
    assert!(outcome.item.assigned_to_id.is_none());

    let much_later = Utc::now() + Duration::days(2);
    assert!(dialer
        .engine
        .queue()
        .get_next_at(&list.id, "alice", much_later)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_release_returns_item_without_counting_attempt() {
    let dialer = create_test_dialer().await;
    let list = static_list_with_leads(&dialer, "Release", 1).await;

    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();

    let err = dialer.engine.release_item(&item.id, "bob").await.unwrap_err();
    assert!(matches!(err, DialerError::Validation(_)));

    let released = dialer.engine.release_item(&item.id, "alice").await.unwrap();
    assert_eq!(released.status, ItemStatus::Pending);
    assert_eq!(released.attempt_count, 0);
    assert!(released.assigned_to_id.is_none());

    let again = dialer.engine.get_next_call_item(&list.id, "bob").await.unwrap().unwrap();
    assert_eq!(again.id, item.id);
}

#[tokio::test]
async fn test_skipped_item_leaves_the_queue() {
    let dialer = create_test_dialer().await;
    let list = static_list_with_leads(&dialer, "Skip", 1).await;

    let item = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    let skipped = dialer.engine.skip_item(&item.id, "alice").await.unwrap();
    assert_eq!(skipped.status, ItemStatus::Skipped);

    assert!(dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_pre_assigned_item_only_goes_to_its_agent() {
    let dialer = create_test_dialer().await;
    let list = static_list_with_leads(&dialer, "Pinned", 1).await;
    let queued = dialer
        .engine
        .list_items(&list.id, Some(ItemStatus::Pending), 10)
        .await
        .unwrap();

    let pinned = dialer.engine.assign_item(&queued[0].id, "carol", true).await.unwrap();
    assert_eq!(pinned.assigned_to_id.as_deref(), Some("carol"));

    let record = dialer.records.get(pinned.lead_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.fields["owner_id"], "carol");

    assert!(dialer.engine.get_next_call_item(&list.id, "dave").await.unwrap().is_none());
    let item = dialer.engine.get_next_call_item(&list.id, "carol").await.unwrap().unwrap();
    assert_eq!(item.id, pinned.id);
}

#[tokio::test]
async fn test_owner_sync_failure_keeps_assignment() {
    let dialer = create_test_dialer().await;
    let list = dialer
        .engine
        .create_call_list(NewCallList::new("Orphans", ListType::Static))
        .await
        .unwrap();
    let added = dialer
        .engine
        .add_items_to_list(
            &list.id,
            vec![NewCallListItem {
                lead_id: Some("not-in-crm".to_string()),
                phone: Some("+15550006".to_string()),
                ..Default::default()
            }],
        )
        .await
        .unwrap();
    let item_id = added.added[0].id.clone();

    let err = dialer.engine.assign_item(&item_id, "erin", true).await.unwrap_err();
    assert!(matches!(err, DialerError::ExternalFailure(_)));

    let item = dialer.engine.get_item(&item_id).await.unwrap();
    assert_eq!(item.assigned_to_id.as_deref(), Some("erin"));
}

#[tokio::test]
async fn test_inactive_list_hands_out_nothing() {
    let dialer = create_test_dialer().await;
    let list = static_list_with_leads(&dialer, "Paused", 2).await;

    dialer.engine.deactivate_list(&list.id).await.unwrap();
    assert!(dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_list_is_not_found() {
    let dialer = create_test_dialer().await;
    let err = dialer.engine.get_next_call_item("missing", "alice").await.unwrap_err();
    assert!(matches!(err, DialerError::NotFound(_)));
}
