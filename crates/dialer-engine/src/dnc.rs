//! Do-not-call registry interface
//!
//! The registry itself is an external collaborator. The default
//! [`RecordFlagDncRegistry`] flags the lead (and its contact, when the CRM
//! exposes contacts through the same source) so downstream filters can
//! exclude it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::record_source::{RecordSource, DO_NOT_CALL_FIELD};
use crate::types::TargetObject;

/// What gets suppressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DncEntry {
    pub lead_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub contact_id: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait DncRegistry: Send + Sync {
    async fn add(&self, entry: &DncEntry) -> Result<()>;
}

/// Marks `do_not_call = true` on the referenced source records
pub struct RecordFlagDncRegistry {
    records: Arc<dyn RecordSource>,
}

impl RecordFlagDncRegistry {
    pub fn new(records: Arc<dyn RecordSource>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl DncRegistry for RecordFlagDncRegistry {
    async fn add(&self, entry: &DncEntry) -> Result<()> {
        if let Some(lead_id) = &entry.lead_id {
            self.records
                .update_field(TargetObject::Lead, lead_id, DO_NOT_CALL_FIELD, Value::Bool(true))
                .await?;
        }
        if let Some(opportunity_id) = &entry.opportunity_id {
            self.records
                .update_field(TargetObject::Opportunity, opportunity_id, DO_NOT_CALL_FIELD, Value::Bool(true))
                .await?;
        }
        info!(
            "🚫 Added to do-not-call: lead={:?} opportunity={:?} phone={:?}",
            entry.lead_id, entry.opportunity_id, entry.phone
        );
        Ok(())
    }
}
