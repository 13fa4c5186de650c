//! Cache Statistics Module
//!
//! Counters describing how requests were satisfied.

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Served fresh from cache with no network call
    pub hits: u64,
    /// Served stale while a background refresh ran
    pub stale_hits: u64,
    /// Required a network fetch
    pub misses: u64,
    /// Joined an in-flight request for the same key
    pub deduplicated: u64,
    /// Background revalidations started
    pub revalidations: u64,
    /// Cached data served because a fetch failed or was aborted
    pub fallbacks: u64,
    /// Entries dropped to respect the capacity bound
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Share of lookups answered from cache (fresh or stale).
    ///
    /// Returns 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_stale_hit(&mut self) {
        self.stale_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_dedup(&mut self) {
        self.deduplicated += 1;
    }

    pub fn record_revalidation(&mut self) {
        self.revalidations += 1;
    }

    pub fn record_fallback(&mut self) {
        self.fallbacks += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
