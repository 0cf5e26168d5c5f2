//! In-process record source
//!
//! Records live behind a `parking_lot::RwLock` in insertion order. Lookups
//! interpret the resolved filter with [`crate::filter::eval`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{RecordSource, SourceRecord};
use crate::error::{DialerError, Result};
use crate::filter::{eval, ResolvedFilter};
use crate::types::TargetObject;

#[derive(Default)]
pub struct InMemoryRecordSource {
    records: RwLock<Vec<SourceRecord>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SourceRecord) {
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    pub fn get(&self, id: &str) -> Option<SourceRecord> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn query_records(&self, object: TargetObject, filter: &ResolvedFilter) -> Result<Vec<SourceRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.object == object && eval::matches(filter, &r.fields))
            .cloned()
            .collect())
    }

    async fn get_record(&self, object: TargetObject, id: &str) -> Result<Option<SourceRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.object == object && r.id == id)
            .cloned())
    }

    async fn update_field(&self, object: TargetObject, id: &str, field: &str, value: Value) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.object == object && r.id == id)
            .ok_or_else(|| DialerError::not_found(format!("{} record {}", object, id)))?;
        record.fields.insert(field.to_string(), value);
        Ok(())
    }
}
