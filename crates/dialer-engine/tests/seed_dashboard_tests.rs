//! Predefined catalog seeding and dashboard rollups

mod common;

use common::{create_test_dialer, static_list_with_leads};
use dialer_engine::prelude::*;

#[tokio::test]
async fn test_seeding_twice_inserts_nothing_new() {
    let dialer = create_test_dialer().await;

    let lists = dialer.engine.ensure_predefined_lists().await.unwrap();
    let dispositions = dialer.engine.ensure_predefined_dispositions().await.unwrap();
    assert_eq!(lists, 5);
    assert_eq!(dispositions, 9);

    assert_eq!(dialer.engine.ensure_predefined_lists().await.unwrap(), 0);
    assert_eq!(dialer.engine.ensure_predefined_dispositions().await.unwrap(), 0);

    assert_eq!(dialer.engine.rules().list_lists(false).await.unwrap().len(), 5);
    let catalog = dialer.engine.rules().disposition_catalog(None).await.unwrap();
    assert_eq!(catalog.merged().len(), 9);
}

#[tokio::test]
async fn test_seed_keeps_existing_list_with_same_name() {
    let dialer = create_test_dialer().await;
    let custom = dialer
        .engine
        .create_call_list(NewCallList::new("Callbacks", ListType::Callback).with_priority(1))
        .await
        .unwrap();

    assert_eq!(dialer.engine.ensure_predefined_lists().await.unwrap(), 4);
    let found = dialer.engine.rules().find_list_by_name("Callbacks").await.unwrap().unwrap();
    assert_eq!(found.id, custom.id);
    assert_eq!(found.priority, 1);
}

#[tokio::test]
async fn test_seeded_dynamic_lists_refresh() {
    let dialer = create_test_dialer().await;
    dialer.engine.ensure_predefined_lists().await.unwrap();

    let results = dialer.engine.refresh_all_dynamic().await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.added == 0));
}

#[tokio::test]
async fn test_merged_catalog_orders_by_sort_order() {
    let dialer = create_test_dialer().await;
    dialer.engine.ensure_predefined_dispositions().await.unwrap();
    let list = static_list_with_leads(&dialer, "Catalog", 0).await;

    dialer
        .engine
        .rules()
        .create_disposition(&NewDisposition {
            call_list_id: Some(list.id.clone()),
            sort_order: 1,
            ..NewDisposition::new("GATEKEEPER", "Reached Gatekeeper")
        })
        .await
        .unwrap();

    let merged = dialer.engine.rules().disposition_catalog(Some(&list.id)).await.unwrap().merged();
    assert_eq!(merged.len(), 10);
    assert_eq!(merged[0].code, "GATEKEEPER");
    assert_eq!(merged[1].code, "NO_ANSWER");
}

#[tokio::test]
async fn test_dashboard_counts_statuses_and_outcomes() {
    let dialer = create_test_dialer().await;
    dialer.engine.ensure_predefined_dispositions().await.unwrap();
    let list = static_list_with_leads(&dialer, "Board", 4).await;

    let first = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    dialer.engine.apply_disposition(&first.id, "NOT_INTERESTED", None, "alice").await.unwrap();
    let second = dialer.engine.get_next_call_item(&list.id, "alice").await.unwrap().unwrap();
    dialer.engine.apply_disposition(&second.id, "NO_ANSWER", None, "alice").await.unwrap();
    dialer.engine.get_next_call_item(&list.id, "bob").await.unwrap().unwrap();

    let dashboard = dialer.engine.list_dashboard(&list.id).await.unwrap();
    assert_eq!(dashboard.list_id, list.id);
    assert_eq!(dashboard.status_counts.total(), 4);
    assert_eq!(dashboard.status_counts.completed, 1);
    assert_eq!(dashboard.status_counts.in_progress, 1);
    assert_eq!(dashboard.status_counts.pending, 2);
    // The requeued item waits for its cadence
    assert_eq!(dashboard.eligible_now, 1);
    assert_eq!(dashboard.calls_last_24h, 2);
    assert_eq!(dashboard.outcomes_last_24h.len(), 2);
    assert!(dashboard.oldest_pending_age_secs.is_some());

    let overview = dialer.engine.dashboard_overview().await.unwrap();
    assert_eq!(overview.len(), 1);
}

#[tokio::test]
async fn test_dashboard_for_unknown_list_is_not_found() {
    let dialer = create_test_dialer().await;
    let err = dialer.engine.list_dashboard("missing").await.unwrap_err();
    assert!(matches!(err, DialerError::NotFound(_)));
}
