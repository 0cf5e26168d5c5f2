//! Domain types shared by the stores and engines
//!
//! Enumerations persist as upper-case strings; `as_str`/`parse` convert
//! between the two and an unknown stored value surfaces as a database error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DialerError, Result};
use crate::filter::FilterExpr;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(DialerError::database(format!(
                        "unknown {} value '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// How a list's membership is maintained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListType {
    /// Fixed membership, items added by hand
    Static,
    /// Membership computed from the filter on refresh
    Dynamic,
    /// Agent-scheduled callbacks, added by hand or by moves
    Callback,
}

string_enum!(ListType { Static => "STATIC", Dynamic => "DYNAMIC", Callback => "CALLBACK" });

/// Source record kind a list draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetObject {
    Lead,
    Opportunity,
}

string_enum!(TargetObject { Lead => "LEAD", Opportunity => "OPPORTUNITY" });

/// Dialing style configured on a list or chosen for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CadenceType {
    Preview,
    Progressive,
    Manual,
}

string_enum!(CadenceType { Preview => "PREVIEW", Progressive => "PROGRESSIVE", Manual => "MANUAL" });

/// Item lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Rescheduled,
    Skipped,
    Removed,
}

string_enum!(ItemStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Rescheduled => "RESCHEDULED",
    Skipped => "SKIPPED",
    Removed => "REMOVED",
});

impl ItemStatus {
    /// Statuses from which an item may be handed to an agent
    pub fn is_assignable(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Rescheduled)
    }

    /// Statuses that end an item's life in its list
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Removed)
    }
}

/// Why an item entered its list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddedReason {
    Manual,
    DynamicRefresh,
    MovedFromList,
    /// Added as the result of a disposition code
    Disposition(String),
}

impl AddedReason {
    pub fn as_db(&self) -> String {
        match self {
            AddedReason::Manual => "manual".to_string(),
            AddedReason::DynamicRefresh => "dynamic_refresh".to_string(),
            AddedReason::MovedFromList => "moved_from_list".to_string(),
            AddedReason::Disposition(code) => code.clone(),
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "manual" => AddedReason::Manual,
            "dynamic_refresh" => AddedReason::DynamicRefresh,
            "moved_from_list" => AddedReason::MovedFromList,
            code => AddedReason::Disposition(code.to_string()),
        }
    }
}

/// A named queue definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub list_type: ListType,
    pub target_object: TargetObject,
    pub filter_criteria: Option<FilterExpr>,
    pub cadence_type: CadenceType,
    pub cadence_hours: Option<i32>,
    pub max_attempts: i32,
    pub cooldown_days: Option<i32>,
    pub priority: i32,
    pub is_active: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub total_count: i64,
    pub pending_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a call list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCallList {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub list_type: ListType,
    #[serde(default = "default_target")]
    pub target_object: TargetObject,
    #[serde(default)]
    pub filter_criteria: Option<FilterExpr>,
    #[serde(default = "default_cadence_type")]
    pub cadence_type: CadenceType,
    #[serde(default)]
    pub cadence_hours: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
    #[serde(default)]
    pub cooldown_days: Option<i32>,
    #[serde(default)]
    pub priority: i32,
}

fn default_target() -> TargetObject {
    TargetObject::Lead
}

fn default_cadence_type() -> CadenceType {
    CadenceType::Preview
}

impl NewCallList {
    pub fn new(name: impl Into<String>, list_type: ListType) -> Self {
        Self {
            name: name.into(),
            description: None,
            list_type,
            target_object: TargetObject::Lead,
            filter_criteria: None,
            cadence_type: CadenceType::Preview,
            cadence_hours: None,
            max_attempts: None,
            cooldown_days: None,
            priority: 0,
        }
    }

    pub fn with_target(mut self, target: TargetObject) -> Self {
        self.target_object = target;
        self
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter_criteria = Some(filter);
        self
    }

    pub fn with_cadence_hours(mut self, hours: i32) -> Self {
        self.cadence_hours = Some(hours);
        self
    }

    pub fn with_max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One dialable unit of work inside exactly one call list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallListItem {
    pub id: String,
    pub call_list_id: String,
    pub lead_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub contact_id: Option<String>,
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub record_status: Option<String>,
    pub status: ItemStatus,
    pub priority: i32,
    pub attempt_count: i32,
    pub assigned_to_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_attempt_result: Option<String>,
    pub disposition: Option<String>,
    pub disposition_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub added_reason: AddedReason,
    pub source_list_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallListItem {
    /// Eligibility for `agent_id` at `now`, given the owning list's attempt cap
    pub fn is_eligible(&self, max_attempts: i32, agent_id: &str, now: DateTime<Utc>) -> bool {
        self.status.is_assignable()
            && self.attempt_count < max_attempts
            && self.next_attempt_at.map_or(true, |t| t <= now)
            && self.expires_at.map_or(true, |t| t > now)
            && self.assigned_to_id.as_deref().map_or(true, |a| a == agent_id)
    }

    /// Identity of the source record this item stands for
    pub fn record_key(&self) -> Option<RecordKey> {
        RecordKey::for_ids(self.lead_id.as_deref(), self.opportunity_id.as_deref())
    }

    /// Record kind and id to write back to, preferring the list's target kind
    pub fn record_ref(&self, preferred: TargetObject) -> Option<(TargetObject, &str)> {
        let lead = self.lead_id.as_deref().map(|id| (TargetObject::Lead, id));
        let opportunity = self.opportunity_id.as_deref().map(|id| (TargetObject::Opportunity, id));
        match preferred {
            TargetObject::Lead => lead.or(opportunity),
            TargetObject::Opportunity => opportunity.or(lead),
        }
    }
}

/// Which source record an item stands for
///
/// An item carrying an opportunity stands for that opportunity, even when it
/// also names the opportunity's lead; lead-only items stand for the lead.
/// Lists dedup on this key, so two opportunities of one lead never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub object: TargetObject,
    pub id: String,
}

impl RecordKey {
    pub fn new(object: TargetObject, id: impl Into<String>) -> Self {
        Self { object, id: id.into() }
    }

    pub fn for_ids(lead_id: Option<&str>, opportunity_id: Option<&str>) -> Option<Self> {
        opportunity_id
            .map(|id| Self::new(TargetObject::Opportunity, id))
            .or_else(|| lead_id.map(|id| Self::new(TargetObject::Lead, id)))
    }
}

/// Input for inserting an item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCallListItem {
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub opportunity_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub record_status: Option<String>,
    /// Overrides the list priority when set
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub assigned_to_id: Option<String>,
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewCallListItem {
    pub fn validate(&self) -> Result<()> {
        if self.lead_id.is_none() && self.opportunity_id.is_none() {
            return Err(DialerError::validation(
                "item must reference a lead or an opportunity",
            ));
        }
        if self.phone.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(DialerError::validation("item requires a phone number"));
        }
        Ok(())
    }

    pub fn record_key(&self) -> Option<RecordKey> {
        RecordKey::for_ids(self.lead_id.as_deref(), self.opportunity_id.as_deref())
    }
}

/// A configurable outcome code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallListDisposition {
    pub id: String,
    pub call_list_id: Option<String>,
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub color: Option<String>,
    pub sort_order: i32,
    pub remove_from_list: bool,
    pub schedule_callback: bool,
    pub add_to_dnc: bool,
    pub move_to_list_id: Option<String>,
    pub move_to_list_name: Option<String>,
    pub update_lead_status: Option<String>,
    pub update_opp_stage: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for defining a disposition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDisposition {
    #[serde(default)]
    pub call_list_id: Option<String>,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub remove_from_list: bool,
    #[serde(default)]
    pub schedule_callback: bool,
    #[serde(default)]
    pub add_to_dnc: bool,
    #[serde(default)]
    pub move_to_list_id: Option<String>,
    #[serde(default)]
    pub move_to_list_name: Option<String>,
    #[serde(default)]
    pub update_lead_status: Option<String>,
    #[serde(default)]
    pub update_opp_stage: Option<String>,
}

impl NewDisposition {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One agent's dialing shift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: String,
    pub user_id: String,
    pub current_list_id: Option<String>,
    pub dialer_mode: CadenceType,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub total_pause_ms: i64,
    pub total_calls: i64,
    pub connected_calls: i64,
    pub total_talk_time_ms: i64,
    pub total_wrap_time_ms: i64,
    pub termination_reason: Option<String>,
}

impl CallSession {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}

/// Counters contributed by one completed call
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CallOutcome {
    pub connected: bool,
    #[serde(default)]
    pub talk_time_ms: i64,
    #[serde(default)]
    pub wrap_time_ms: i64,
}

/// Immutable audit record of one call attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub id: String,
    pub call_list_id: String,
    pub item_id: String,
    pub lead_id: Option<String>,
    pub opportunity_id: Option<String>,
    pub contact_id: Option<String>,
    pub agent_id: String,
    pub outcome: String,
    pub disposition_id: Option<String>,
    pub notes: Option<String>,
    pub phone: Option<String>,
    pub call_started_at: Option<DateTime<Utc>>,
    pub talk_time_ms: Option<i64>,
    pub logged_at: DateTime<Utc>,
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item() -> CallListItem {
        let now = Utc::now();
        CallListItem {
            id: new_id(),
            call_list_id: "list".to_string(),
            lead_id: Some("lead-1".to_string()),
            opportunity_id: None,
            contact_id: None,
            account_id: None,
            display_name: None,
            phone: Some("+15550100".to_string()),
            address: None,
            record_status: None,
            status: ItemStatus::Pending,
            priority: 0,
            attempt_count: 0,
            assigned_to_id: None,
            assigned_at: None,
            next_attempt_at: None,
            expires_at: None,
            last_attempt_at: None,
            last_attempt_result: None,
            disposition: None,
            disposition_at: None,
            completed_at: None,
            added_reason: AddedReason::Manual,
            source_list_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_round_trip_and_unknown() {
        assert_eq!(ItemStatus::parse("IN_PROGRESS").unwrap(), ItemStatus::InProgress);
        assert!(ItemStatus::parse("LOST").is_err());
        assert!(ItemStatus::Removed.is_terminal());
        assert!(!ItemStatus::Skipped.is_assignable());
    }

    #[test]
    fn test_added_reason_disposition_code() {
        assert_eq!(AddedReason::from_db("CALLBACK"), AddedReason::Disposition("CALLBACK".to_string()));
        assert_eq!(AddedReason::MovedFromList.as_db(), "moved_from_list");
    }

    #[test]
    fn test_eligibility_predicate() {
        let now = Utc::now();
        let mut it = item();
        assert!(it.is_eligible(6, "agent-a", now));

        it.next_attempt_at = Some(now + Duration::minutes(5));
        assert!(!it.is_eligible(6, "agent-a", now));
        it.next_attempt_at = None;

        it.expires_at = Some(now);
        assert!(!it.is_eligible(6, "agent-a", now));
        it.expires_at = None;

        it.assigned_to_id = Some("agent-b".to_string());
        assert!(!it.is_eligible(6, "agent-a", now));
        assert!(it.is_eligible(6, "agent-b", now));

        it.attempt_count = 6;
        assert!(!it.is_eligible(6, "agent-b", now));
    }

    #[test]
    fn test_new_item_requires_reference_and_phone() {
        let mut new_item = NewCallListItem {
            phone: Some("+15550100".to_string()),
            ..Default::default()
        };
        assert!(matches!(new_item.validate(), Err(DialerError::Validation(_))));
        new_item.lead_id = Some("lead-1".to_string());
        assert!(new_item.validate().is_ok());
        new_item.phone = Some("  ".to_string());
        assert!(new_item.validate().is_err());
    }

    #[test]
    fn test_opportunities_of_one_lead_have_distinct_keys() {
        let first = RecordKey::for_ids(Some("lead-1"), Some("opp-1")).unwrap();
        let second = RecordKey::for_ids(Some("lead-1"), Some("opp-2")).unwrap();
        assert_ne!(first, second);
        assert_eq!(first, RecordKey::new(TargetObject::Opportunity, "opp-1"));

        let lead = RecordKey::for_ids(Some("opp-1"), None).unwrap();
        assert_eq!(lead.object, TargetObject::Lead);
        assert_ne!(lead, first);
        assert!(RecordKey::for_ids(None, None).is_none());
    }
}
