//! Two-tier disposition lookup
//!
//! A catalog is built per call list from two maps: global definitions and the
//! list's own definitions. Lookup consults the list map first. A list-scoped
//! definition shadows the global one with the same code even when it is
//! inactive, so a list can retire a global code for itself.

use std::collections::HashMap;

use crate::types::CallListDisposition;

#[derive(Debug, Clone, Default)]
pub struct DispositionCatalog {
    global: HashMap<String, CallListDisposition>,
    list: HashMap<String, CallListDisposition>,
}

impl DispositionCatalog {
    /// Split `definitions` into the global tier and the tier for `list_id`
    ///
    /// Definitions scoped to other lists are ignored.
    pub fn from_definitions(list_id: Option<&str>, definitions: Vec<CallListDisposition>) -> Self {
        let mut catalog = Self::default();
        for definition in definitions {
            match definition.call_list_id.as_deref() {
                None => {
                    catalog.global.insert(definition.code.clone(), definition);
                }
                Some(scope) if Some(scope) == list_id => {
                    catalog.list.insert(definition.code.clone(), definition);
                }
                Some(_) => {}
            }
        }
        catalog
    }

    /// Definition in effect for `code`, active or not
    pub fn lookup(&self, code: &str) -> Option<&CallListDisposition> {
        self.list.get(code).or_else(|| self.global.get(code))
    }

    /// Active definition in effect for `code`
    pub fn resolve(&self, code: &str) -> Option<&CallListDisposition> {
        self.lookup(code).filter(|d| d.is_active)
    }

    /// Every active definition in effect, ordered for display
    pub fn merged(&self) -> Vec<CallListDisposition> {
        let mut merged: Vec<CallListDisposition> = self
            .global
            .iter()
            .filter(|(code, _)| !self.list.contains_key(*code))
            .map(|(_, d)| d)
            .chain(self.list.values())
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        merged.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.code.cmp(&b.code)));
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.list.is_empty()
    }
}
