//! Matched-rule cache
//!
//! One concurrent map per rule id, keyed by the bean/attribute match name,
//! plus the value for rules whose outcome depends on it.
//! Entries not touched during a successful scrape are evicted afterwards.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::engine::MatchedRule;

/// Cached outcome of applying one rule to one match name
#[derive(Debug, Clone)]
pub enum RuleOutcome {
    /// The rule's pattern did not match
    Unmatched,
    Matched(Arc<MatchedRule>),
}

impl RuleOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, RuleOutcome::Matched(_))
    }
}

/// Per-rule cache of match outcomes
#[derive(Debug)]
pub struct MatchedRuleCache {
    rules: Vec<DashMap<String, RuleOutcome>>,
}

impl MatchedRuleCache {
    /// Create a cache for a rule set of `rule_count` rules
    pub fn new(rule_count: usize) -> Self {
        Self {
            rules: (0..rule_count).map(|_| DashMap::new()).collect(),
        }
    }

    pub fn get(&self, rule_id: usize, key: &str) -> Option<RuleOutcome> {
        self.rules
            .get(rule_id)
            .and_then(|map| map.get(key).map(|entry| entry.value().clone()))
    }

    pub fn put(&self, rule_id: usize, key: String, outcome: RuleOutcome) {
        if let Some(map) = self.rules.get(rule_id) {
            map.insert(key, outcome);
        }
    }

    /// Drop every entry the tracker did not see
    pub fn evict_stale(&self, tracker: &StalenessTracker) {
        for (rule_id, map) in self.rules.iter().enumerate() {
            match tracker.seen.get(&rule_id) {
                Some(keys) => map.retain(|key, _| keys.contains(key)),
                None => map.clear(),
            }
        }
    }

    /// Total number of cached outcomes
    pub fn len(&self) -> usize {
        self.rules.iter().map(DashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Records which cache entries one scrape used
#[derive(Debug, Default)]
pub struct StalenessTracker {
    seen: HashMap<usize, HashSet<String>>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule_id: usize, key: &str) {
        let keys = self.seen.entry(rule_id).or_default();
        if !keys.contains(key) {
            keys.insert(key.to_string());
        }
    }

    /// Number of distinct cache entries touched
    pub fn cached_count(&self) -> usize {
        self.seen.values().map(HashSet::len).sum()
    }
}
