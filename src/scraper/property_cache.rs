//! Property-list cache
//!
//! Memoizes the ordered key properties of each bean so default naming does
//! not re-tokenize identifiers on every scrape.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::collector::{parse_key_properties, KeyProperties, ObjectName};

/// Concurrent cache of parsed key property lists
#[derive(Debug, Default)]
pub struct PropertyListCache {
    entries: DashMap<ObjectName, Arc<KeyProperties>>,
}

impl PropertyListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered key properties of `name`, parsed on first use
    pub fn get(&self, name: &ObjectName) -> Arc<KeyProperties> {
        if let Some(props) = self.entries.get(name) {
            return Arc::clone(props.value());
        }

        let props = Arc::new(parse_key_properties(name.key_property_list()));
        self.entries
            .entry(name.clone())
            .or_insert_with(|| Arc::clone(&props))
            .value()
            .clone()
    }

    /// Drop entries for beans not in `alive`
    pub fn only_keep(&self, alive: &HashSet<ObjectName>) {
        self.entries.retain(|name, _| alive.contains(name));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
