//! Cache Entry Module
//!
//! Defines the structure for individual cache entries and their freshness
//! classification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CachePolicy;

// == Freshness ==
/// Where an entry sits on its decay curve.
///
/// Entries only move forward through these states as time passes; a new
/// successful fetch starts them over at `Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Younger than `ttl`
    Fresh,
    /// Younger than `stale_time`
    Stale,
    /// Younger than `max_age`: only served when a fetch fails
    LastResort,
    /// Past `max_age`
    Expired,
}

// == Cache Entry ==
/// A cached response body together with the policy it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored payload
    pub value: Value,
    /// Store timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Policy active when the entry was stored
    pub policy: CachePolicy,
}

impl CacheEntry {
    // == Constructor ==
    pub fn new(value: Value, policy: CachePolicy, now_ms: u64) -> Self {
        Self {
            value,
            stored_at: now_ms,
            policy,
        }
    }

    /// Milliseconds since the entry was stored. Saturates at zero if the
    /// clock went backwards.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at)
    }

    // == Freshness ==
    /// Classifies the entry at `now_ms`.
    ///
    /// Each window is half-open: at exactly `ttl` elapsed the entry is
    /// already stale, at exactly `max_age` it is already expired.
    pub fn freshness(&self, now_ms: u64) -> Freshness {
        let age = self.age_ms(now_ms) as u128;
        if age < self.policy.ttl.as_millis() {
            Freshness::Fresh
        } else if age < self.policy.stale_time.as_millis() {
            Freshness::Stale
        } else if age < self.policy.max_age.as_millis() {
            Freshness::LastResort
        } else {
            Freshness::Expired
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.freshness(now_ms) == Freshness::Expired
    }
}
