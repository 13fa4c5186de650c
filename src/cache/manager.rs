//! Cache Manager Module
//!
//! Shared handle over the entry store plus the registry of in-flight
//! requests used to de-duplicate concurrent fetches of the same key.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::cache::{CachePolicy, CacheSnapshot, CacheStats, CacheStore, Freshness};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// An in-flight fetch that any number of callers can await.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

struct PendingSlot {
    id: u64,
    fetch: SharedFetch,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingSlot>>>;

// == Cache Manager ==
pub struct CacheManager {
    store: RwLock<CacheStore>,
    pending: PendingMap,
    next_pending_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a manager on the system clock.
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::new(CacheStore::new(max_entries)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_pending_id: AtomicU64::new(1),
            clock,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Lookups ==
    /// Value for `key` unless it is past its max age.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.now_ms();
        self.store.write().await.get(key, now)
    }

    /// Value for `key` regardless of age.
    pub async fn get_any(&self, key: &str) -> Option<Value> {
        self.store.write().await.get_any(key)
    }

    /// Value and freshness read under one lock, regardless of age.
    pub async fn lookup(&self, key: &str) -> Option<(Value, Freshness)> {
        let now = self.now_ms();
        let mut store = self.store.write().await;
        let freshness = store.freshness(key, now)?;
        let value = store.get_any(key)?;
        Some((value, freshness))
    }

    /// `None` when the key is absent.
    pub async fn freshness(&self, key: &str) -> Option<Freshness> {
        let now = self.now_ms();
        self.store.read().await.freshness(key, now)
    }

    pub async fn is_fresh(&self, key: &str) -> bool {
        self.freshness(key).await == Some(Freshness::Fresh)
    }

    pub async fn is_stale(&self, key: &str) -> bool {
        self.freshness(key).await == Some(Freshness::Stale)
    }

    /// True when nothing servable is held: absent or past max age.
    pub async fn is_expired(&self, key: &str) -> bool {
        matches!(self.freshness(key).await, None | Some(Freshness::Expired))
    }

    // == Mutations ==
    /// Stores `value`, resetting the entry's age.
    pub async fn set(&self, key: &str, value: Value, policy: CachePolicy) {
        let now = self.now_ms();
        self.store.write().await.set(key, value, policy, now);
        debug!(key, "cache entry stored");
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        self.store.write().await.remove(key)
    }

    /// Removes every entry whose key contains `pattern`.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let removed = self.store.write().await.remove_matching(pattern);
        debug!(pattern, removed, "cache entries invalidated");
        removed
    }

    /// Drops all entries. In-flight requests keep running and will store
    /// their results when they settle.
    pub async fn clear(&self) {
        self.store.write().await.clear();
        info!("cache cleared");
    }

    /// Removes entries past their max age.
    pub async fn purge_expired(&self) -> usize {
        let now = self.now_ms();
        self.store.write().await.purge_expired(now)
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn record<F>(&self, update: F)
    where
        F: FnOnce(&mut CacheStats),
    {
        update(self.store.write().await.stats_mut());
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    // == Pending Requests ==
    /// The in-flight fetch for `key`, if any.
    pub async fn pending(&self, key: &str) -> Option<SharedFetch> {
        self.pending
            .lock()
            .await
            .get(key)
            .map(|slot| slot.fetch.clone())
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Registers `fetch` as the in-flight request for `key`.
    ///
    /// If another request for `key` is already registered, that one is
    /// returned instead and `fetch` is dropped unpolled; the flag tells the
    /// caller which happened. The registered future is driven on its own task
    /// so it settles (and leaves the registry) even if every caller stops
    /// awaiting it.
    pub async fn register_pending(
        &self,
        key: &str,
        fetch: BoxFuture<'static, Result<Value>>,
    ) -> (SharedFetch, bool) {
        let mut pending = self.pending.lock().await;
        if let Some(slot) = pending.get(key) {
            return (slot.fetch.clone(), false);
        }

        let id = self.next_pending_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.pending);
        let owned_key = key.to_string();

        let shared = async move {
            let result = fetch.await;
            let mut pending = registry.lock().await;
            if pending.get(&owned_key).is_some_and(|slot| slot.id == id) {
                pending.remove(&owned_key);
            }
            result
        }
        .boxed()
        .shared();

        pending.insert(
            key.to_string(),
            PendingSlot {
                id,
                fetch: shared.clone(),
            },
        );
        drop(pending);

        tokio::spawn(shared.clone().map(|_| ()));
        (shared, true)
    }

    // == Persistence ==
    /// Writes persisted-policy entries to `path`.
    pub async fn save_to(&self, path: &Path) -> Result<usize> {
        let now = self.now_ms();
        let snapshot = self.store.read().await.snapshot(now);
        let count = snapshot.entries.len();
        snapshot.save(path).await?;
        Ok(count)
    }

    /// Restores entries from `path`. Missing files restore nothing.
    pub async fn load_from(&self, path: &Path) -> Result<usize> {
        let Some(snapshot) = CacheSnapshot::load(path).await? else {
            return Ok(0);
        };
        let now = self.now_ms();
        let restored = self.store.write().await.restore(snapshot, now);
        info!(path = %path.display(), restored, "cache snapshot restored");
        Ok(restored)
    }
}
