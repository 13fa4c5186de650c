//! LRU Tracker Module
//!
//! Recency ordering used to bound the number of cached responses.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks access order for LRU eviction.
///
/// Every touch stamps the key with a monotonically increasing tick. The
/// `by_tick` index keeps keys ordered oldest-first so eviction and touch are
/// both `O(log n)`.
#[derive(Debug, Default)]
pub struct LruTracker {
    tick: u64,
    by_key: HashMap<String, u64>,
    by_tick: BTreeMap<u64, String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if new.
    pub fn touch(&mut self, key: &str) {
        self.tick += 1;
        if let Some(previous) = self.by_key.insert(key.to_string(), self.tick) {
            self.by_tick.remove(&previous);
        }
        self.by_tick.insert(self.tick, key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.by_key.remove(key) {
            self.by_tick.remove(&tick);
        }
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.by_tick.pop_first()?;
        self.by_key.remove(&key);
        Some(key)
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_tick.clear();
    }
}
