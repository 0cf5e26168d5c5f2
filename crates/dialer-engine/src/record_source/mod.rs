//! # Record Source Adapter
//!
//! The dialer never owns lead or opportunity records. It reads them through
//! [`RecordSource`] to evaluate a list's targeting filter and writes them back
//! only to apply disposition side effects (status or stage changes, owner
//! assignment, the do-not-call flag).
//!
//! Two implementations ship with the crate:
//!
//! - [`SqliteRecordSource`]: records stored as JSON documents in the
//!   `crm_records` table; filters are compiled to SQL.
//! - [`InMemoryRecordSource`]: records held in process; filters are
//!   interpreted. Useful for embedding and tests.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::filter::eval;
use crate::filter::ResolvedFilter;
use crate::types::TargetObject;

pub use memory::InMemoryRecordSource;
pub use sqlite::SqliteRecordSource;

/// Field written by the default DNC registry
pub const DO_NOT_CALL_FIELD: &str = "do_not_call";

/// Field holding an opportunity's pipeline stage
pub const STAGE_FIELD: &str = "stage";

/// Field holding a lead's status
pub const STATUS_FIELD: &str = "status";

/// Field holding a record's owner
pub const OWNER_FIELD: &str = "owner_id";

/// A lead or opportunity as seen by the dialer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub object: TargetObject,
    pub fields: Map<String, Value>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, object: TargetObject, fields: Value) -> Self {
        Self {
            id: id.into(),
            object,
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    fn text(&self, path: &str) -> Option<String> {
        eval::field(&self.fields, path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// First non-empty phone among `phone_fields`
    pub fn phone(&self, phone_fields: &[String]) -> Option<String> {
        phone_fields.iter().find_map(|f| self.text(f))
    }

    /// `name`, or `first_name last_name`
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.text("name") {
            return Some(name);
        }
        let parts: Vec<String> = ["first_name", "last_name"]
            .iter()
            .filter_map(|f| self.text(f))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// One-line postal address from the usual address fields
    pub fn address(&self) -> Option<String> {
        if let Some(address) = self.text("address") {
            return Some(address);
        }
        let parts: Vec<String> = ["street", "city", "state", "postal_code"]
            .iter()
            .filter_map(|f| self.text(f))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    /// Lead status or opportunity stage, depending on the record kind
    pub fn record_status(&self) -> Option<String> {
        match self.object {
            TargetObject::Lead => self.text(STATUS_FIELD),
            TargetObject::Opportunity => self.text(STAGE_FIELD),
        }
    }

    pub fn contact_id(&self) -> Option<String> {
        self.text("contact_id")
    }

    pub fn account_id(&self) -> Option<String> {
        self.text("account_id")
    }

    /// Lead behind an opportunity, when the CRM links one
    pub fn lead_id(&self) -> Option<String> {
        match self.object {
            TargetObject::Lead => Some(self.id.clone()),
            TargetObject::Opportunity => self.text("lead_id"),
        }
    }
}

/// Narrow read/write interface to the CRM's records
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records of kind `object` matching an already-resolved filter
    async fn query_records(&self, object: TargetObject, filter: &ResolvedFilter) -> Result<Vec<SourceRecord>>;

    async fn get_record(&self, object: TargetObject, id: &str) -> Result<Option<SourceRecord>>;

    /// Set one field on a record; unknown records are `NotFound`
    async fn update_field(&self, object: TargetObject, id: &str, field: &str, value: Value) -> Result<()>;

    /// Hand a record to a new owner
    async fn update_owner(&self, object: TargetObject, id: &str, owner_id: &str) -> Result<()> {
        self.update_field(object, id, OWNER_FIELD, Value::String(owner_id.to_string())).await
    }
}
