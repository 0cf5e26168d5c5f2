//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use dialer_engine::prelude::*;

pub struct TestDialer {
    pub engine: DialerEngine,
    pub records: Arc<InMemoryRecordSource>,
}

/// Engine over an in-memory database and record source
pub async fn create_test_dialer() -> TestDialer {
    create_test_dialer_with(DialerConfig::default()).await
}

pub async fn create_test_dialer_with(config: DialerConfig) -> TestDialer {
    let db = DatabaseManager::new_in_memory()
        .await
        .expect("Failed to create test database");
    let records = Arc::new(InMemoryRecordSource::new());
    let source: Arc<dyn RecordSource> = records.clone();
    let dnc: Arc<dyn DncRegistry> = Arc::new(RecordFlagDncRegistry::new(source.clone()));
    TestDialer {
        engine: DialerEngine::new(config, db, source, dnc),
        records,
    }
}

pub fn lead(id: &str, phone: Option<&str>, created_at: DateTime<Utc>) -> SourceRecord {
    let mut fields = json!({
        "first_name": "Lead",
        "last_name": id,
        "status": "new",
        "created_at": created_at.to_rfc3339(),
        "do_not_call": false,
    });
    if let Some(phone) = phone {
        fields["phone"] = json!(phone);
    }
    SourceRecord::new(id, TargetObject::Lead, fields)
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

/// Static list holding one item per lead `lead-0..count`
pub async fn static_list_with_leads(dialer: &TestDialer, name: &str, count: usize) -> CallList {
    let list = dialer
        .engine
        .create_call_list(NewCallList::new(name, ListType::Static).with_cadence_hours(1))
        .await
        .expect("Failed to create list");

    let ids: Vec<String> = (0..count).map(|i| format!("{}-lead-{}", name, i)).collect();
    for (i, id) in ids.iter().enumerate() {
        dialer
            .records
            .insert(lead(id, Some(&format!("+1555000{:04}", i)), hours_ago(1)));
    }
    let added = dialer
        .engine
        .add_records_to_list(&list.id, &ids)
        .await
        .expect("Failed to add records");
    assert_eq!(added.added.len(), count);
    list
}
