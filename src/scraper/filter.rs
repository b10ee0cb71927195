//! Attribute filter
//!
//! Static exclusions and force-inclusions come from configuration. Dynamic
//! exclusions are learned the first time an attribute yields an unsupported
//! value, so it is not fetched again.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};

use crate::collector::ObjectName;

/// Per-bean attribute inclusion rules
#[derive(Debug)]
pub struct AttributeFilter {
    excluded: HashMap<ObjectName, HashSet<String>>,
    included: HashMap<ObjectName, HashSet<String>>,
    learned: DashMap<ObjectName, HashSet<String>>,
    auto_exclude: bool,
}

impl Default for AttributeFilter {
    fn default() -> Self {
        Self {
            excluded: HashMap::new(),
            included: HashMap::new(),
            learned: DashMap::new(),
            auto_exclude: true,
        }
    }
}

impl AttributeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statically exclude attributes of a bean
    pub fn with_excluded<I, S>(mut self, name: ObjectName, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded
            .entry(name)
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Force-include attributes of a bean, overriding learned exclusions
    pub fn with_included<I, S>(mut self, name: ObjectName, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included
            .entry(name)
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Enable or disable learning of unsupported attributes
    pub fn with_auto_exclude(mut self, enabled: bool) -> Self {
        self.auto_exclude = enabled;
        self
    }

    pub fn auto_exclude_enabled(&self) -> bool {
        self.auto_exclude
    }

    /// Whether the attribute is statically or dynamically excluded
    pub fn exclude(&self, name: &ObjectName, attribute: &str) -> bool {
        self.excluded
            .get(name)
            .is_some_and(|attrs| attrs.contains(attribute))
            || self
                .learned
                .get(name)
                .is_some_and(|attrs| attrs.contains(attribute))
    }

    /// Whether the attribute is force-included
    pub fn include(&self, name: &ObjectName, attribute: &str) -> bool {
        self.included
            .get(name)
            .is_some_and(|attrs| attrs.contains(attribute))
    }

    /// Remember an attribute that produced an unsupported value.
    ///
    /// Returns `true` if a new exclusion was recorded.
    pub fn add_auto_exclusion(&self, name: &ObjectName, attribute: &str) -> bool {
        if !self.auto_exclude || self.include(name, attribute) {
            return false;
        }
        self.learned
            .entry(name.clone())
            .or_default()
            .insert(attribute.to_string())
    }

    /// Drop learned exclusions for beans not in `alive`
    pub fn only_keep(&self, alive: &HashSet<ObjectName>) {
        self.learned.retain(|name, _| alive.contains(name));
    }

    /// Number of beans with learned exclusions
    pub fn learned_len(&self) -> usize {
        self.learned.len()
    }
}
