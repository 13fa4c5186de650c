//! Cache Store Module
//!
//! Entry storage combining a HashMap with LRU tracking and age-based decay.
//! All time-dependent operations take `now_ms` explicitly; the manager layer
//! supplies it from its clock.

use std::collections::HashMap;

use serde_json::Value;

use crate::cache::{
    CacheEntry, CachePolicy, CacheSnapshot, CacheStats, Freshness, LruTracker, PersistedEntry,
};

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries, 0 = unbounded
    max_entries: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_entries` - Capacity bound; `0` disables eviction
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
        }
    }

    // == Set ==
    /// Stores a value, replacing any previous entry and resetting its age.
    ///
    /// If the key is new and the store is at capacity, the least recently
    /// used entry is evicted first.
    pub fn set(&mut self, key: &str, value: Value, policy: CachePolicy, now_ms: u64) {
        let is_overwrite = self.entries.contains_key(key);

        if !is_overwrite && self.max_entries > 0 {
            while self.entries.len() >= self.max_entries {
                match self.lru.evict_oldest() {
                    Some(evicted) => {
                        self.entries.remove(&evicted);
                        self.stats.record_eviction();
                    }
                    None => break,
                }
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, policy, now_ms));
        self.lru.touch(key);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Returns the value unless it is past its max age.
    pub fn get(&mut self, key: &str, now_ms: u64) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(now_ms) {
            return None;
        }
        let value = entry.value.clone();
        self.lru.touch(key);
        Some(value)
    }

    /// Returns the value whatever its age.
    pub fn get_any(&mut self, key: &str) -> Option<Value> {
        let value = self.entries.get(key)?.value.clone();
        self.lru.touch(key);
        Some(value)
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Classification of `key` at `now_ms`, `None` when absent.
    pub fn freshness(&self, key: &str, now_ms: u64) -> Option<Freshness> {
        self.entries.get(key).map(|e| e.freshness(now_ms))
    }

    // == Remove ==
    /// Removes one entry. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        existed
    }

    /// Removes every entry whose key contains `pattern`.
    pub fn remove_matching(&mut self, pattern: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect();
        for key in &keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }
        self.stats.set_total_entries(self.entries.len());
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Purge Expired ==
    /// Drops entries past their max age. Returns the number removed.
    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        self.stats.set_total_entries(self.entries.len());
        expired.len()
    }

    // == Persistence ==
    /// Entries whose policy asks to be persisted and that are still usable.
    pub fn snapshot(&self, now_ms: u64) -> CacheSnapshot {
        let mut entries: Vec<PersistedEntry> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.policy.persist && !entry.is_expired(now_ms))
            .map(|(key, entry)| PersistedEntry {
                key: key.clone(),
                entry: entry.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        CacheSnapshot::new(entries, now_ms)
    }

    /// Loads persisted entries, skipping expired ones and keys already held.
    /// Returns the number restored.
    pub fn restore(&mut self, snapshot: CacheSnapshot, now_ms: u64) -> usize {
        let mut restored = 0;
        for PersistedEntry { key, entry } in snapshot.entries {
            if entry.is_expired(now_ms) || self.entries.contains_key(&key) {
                continue;
            }
            if self.max_entries > 0 && self.entries.len() >= self.max_entries {
                break;
            }
            self.lru.touch(&key);
            self.entries.insert(key, entry);
            restored += 1;
        }
        self.stats.set_total_entries(self.entries.len());
        restored
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
