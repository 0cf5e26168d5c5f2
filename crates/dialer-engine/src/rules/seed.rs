//! Predefined list and disposition catalog

use serde_json::json;

use crate::filter::{Comparison, FilterExpr, TimeUnit};
use crate::record_source::DO_NOT_CALL_FIELD;
use crate::types::{CadenceType, ListType, NewCallList, NewDisposition, TargetObject};

/// Name of the seeded list that callback dispositions move items into
pub const CALLBACKS_LIST: &str = "Callbacks";

fn callable() -> FilterExpr {
    FilterExpr::not(FilterExpr::eq(DO_NOT_CALL_FIELD, true))
}

pub fn predefined_lists() -> Vec<NewCallList> {
    vec![
        NewCallList::new("New Leads (Last 4 Hours)", ListType::Dynamic)
            .with_description("Speed-to-lead queue for leads created in the last four hours")
            .with_filter(FilterExpr::and(vec![
                FilterExpr::newer_than("created_at", 4, TimeUnit::Hours),
                callable(),
            ]))
            .with_cadence_hours(1)
            .with_max_attempts(6)
            .with_priority(100),
        NewCallList::new("Fresh Leads (Last 7 Days)", ListType::Dynamic)
            .with_description("Open leads from the past week")
            .with_filter(FilterExpr::and(vec![
                FilterExpr::newer_than("created_at", 7, TimeUnit::Days),
                FilterExpr::is_in("status", vec![json!("new"), json!("contacted")]),
                callable(),
            ]))
            .with_cadence_hours(24)
            .with_max_attempts(6)
            .with_priority(50),
        NewCallList {
            cadence_type: CadenceType::Manual,
            ..NewCallList::new(CALLBACKS_LIST, ListType::Callback)
                .with_description("Agent-scheduled callbacks")
                .with_max_attempts(3)
                .with_priority(200)
        },
        NewCallList::new("Stale Opportunities", ListType::Dynamic)
            .with_description("Open opportunities untouched for 30 days")
            .with_target(TargetObject::Opportunity)
            .with_filter(FilterExpr::and(vec![
                FilterExpr::older_than("updated_at", 30, TimeUnit::Days),
                FilterExpr::not(FilterExpr::is_in("stage", vec![json!("closed_won"), json!("closed_lost")])),
                FilterExpr::compare("amount", Comparison::Gt, 0),
                callable(),
            ]))
            .with_cadence_hours(48)
            .with_max_attempts(4)
            .with_priority(10),
        NewCallList::new("Reactivation", ListType::Static)
            .with_description("Hand-picked past customers")
            .with_cadence_hours(72)
            .with_max_attempts(3),
    ]
}

fn disposition(code: &str, name: &str, category: &str, color: &str, sort_order: i32) -> NewDisposition {
    NewDisposition {
        category: Some(category.to_string()),
        color: Some(color.to_string()),
        sort_order,
        ..NewDisposition::new(code, name)
    }
}

pub fn predefined_dispositions() -> Vec<NewDisposition> {
    vec![
        disposition("NO_ANSWER", "No Answer", "no_contact", "#9CA3AF", 10),
        disposition("VOICEMAIL", "Left Voicemail", "no_contact", "#60A5FA", 20),
        disposition("BUSY", "Busy Signal", "no_contact", "#FBBF24", 30),
        NewDisposition {
            schedule_callback: true,
            move_to_list_name: Some(CALLBACKS_LIST.to_string()),
            ..disposition("CALLBACK", "Callback Requested", "contact", "#34D399", 40)
        },
        NewDisposition {
            remove_from_list: true,
            update_lead_status: Some("appointment_set".to_string()),
            ..disposition("APPOINTMENT_SET", "Appointment Set", "success", "#10B981", 50)
        },
        NewDisposition {
            remove_from_list: true,
            update_opp_stage: Some("closed_won".to_string()),
            ..disposition("SALE", "Sale", "success", "#059669", 60)
        },
        NewDisposition {
            remove_from_list: true,
            update_lead_status: Some("not_interested".to_string()),
            ..disposition("NOT_INTERESTED", "Not Interested", "contact", "#F87171", 70)
        },
        NewDisposition {
            remove_from_list: true,
            update_lead_status: Some("bad_number".to_string()),
            ..disposition("WRONG_NUMBER", "Wrong Number", "bad_data", "#A78BFA", 80)
        },
        NewDisposition {
            remove_from_list: true,
            add_to_dnc: true,
            update_lead_status: Some("do_not_call".to_string()),
            ..disposition("DO_NOT_CALL", "Do Not Call", "compliance", "#DC2626", 90)
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_well_formed() {
        let lists = predefined_lists();
        let names: HashSet<&str> = lists.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names.len(), lists.len());
        for list in &lists {
            if list.list_type == ListType::Dynamic {
                list.filter_criteria.as_ref().unwrap().validate().unwrap();
            }
        }

        let dispositions = predefined_dispositions();
        let codes: HashSet<&str> = dispositions.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes.len(), dispositions.len());
        assert!(dispositions.iter().all(|d| d.call_list_id.is_none()));
    }

    #[test]
    fn test_callback_moves_into_seeded_list() {
        let callback = predefined_dispositions()
            .into_iter()
            .find(|d| d.code == "CALLBACK")
            .unwrap();
        assert!(callback.schedule_callback);
        assert!(predefined_lists()
            .iter()
            .any(|l| Some(l.name.as_str()) == callback.move_to_list_name.as_deref()));
    }
}
