//! Hit Counters Module
//!
//! Tracks per-key cache hits while debug mode is enabled.

use std::collections::HashMap;

use serde::Serialize;

// == Hit Counters ==
/// Per-key hit counts. Only updated in debug mode and reset on every clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HitCounters {
    counts: HashMap<String, u64>,
}

impl HitCounters {
    // == Constructor ==
    /// Creates an empty counter set.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// Increments the hit counter for `key`.
    pub fn record_hit(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Hits recorded for `key`, zero if none.
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Sum of hits across all keys.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Owned copy of the raw counts.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.clone()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}
