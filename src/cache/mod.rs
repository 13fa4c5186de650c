//! Cache Module
//!
//! In-memory response cache with per-endpoint freshness windows, LRU
//! capacity bound, in-flight request de-duplication and optional snapshot
//! persistence.

mod entry;
mod key;
mod lru;
mod manager;
mod persist;
mod policy;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{CacheEntry, Freshness};
pub use key::{
    cache_key_for, generate_cache_key, is_tenant_scoped, ParsedEndpoint, SKIP_CACHE_PARAM,
    TENANT_SCOPED_PREFIXES,
};
pub use lru::LruTracker;
pub use manager::{CacheManager, SharedFetch};
pub use persist::{CacheSnapshot, PersistedEntry, SNAPSHOT_VERSION};
pub use policy::{CachePolicy, EndpointMatcher, PolicyTable};
pub use stats::CacheStats;
pub use store::CacheStore;

/// Default capacity bound for the entry store.
pub const DEFAULT_MAX_ENTRIES: usize = 500;
