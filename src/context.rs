//! Application Context
//!
//! Builds the process-wide services once and hands out shared handles.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{CacheManager, PolicyTable};
use crate::cached::CachedClient;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::session::{AuthService, RouteGuard, SessionManager};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::transport::ApiClient;

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub cache: Arc<CacheManager>,
    pub api: ApiClient,
    pub cached: CachedClient,
    pub auth: AuthService,
}

impl AppContext {
    /// Wires every service from `config` and restores the cache snapshot.
    ///
    /// Tokens live in `config.storage_path` when set, in memory otherwise.
    /// A snapshot that cannot be read is logged and skipped.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        let context = Self::build(config, storage, Arc::new(SystemClock))?;

        if let Some(path) = &config.cache_persist_path {
            if let Err(err) = context.cache.load_from(path).await {
                warn!(path = %path.display(), error = %err, "ignoring unreadable cache snapshot");
            }
        }
        Ok(context)
    }

    /// Wires every service over explicit storage and clock.
    pub fn build(
        config: &Config,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let session = Arc::new(SessionManager::with_clock(storage, Arc::clone(&clock)));
        let cache = Arc::new(CacheManager::with_clock(config.cache_max_entries, clock));
        let api = ApiClient::new(config, Arc::clone(&session))?;
        let cached = CachedClient::new(api.clone(), Arc::clone(&cache), PolicyTable::default());
        let auth = AuthService::new(api.clone(), Arc::clone(&cache));

        info!(
            base_url = %config.api_base_url,
            cache_max_entries = config.cache_max_entries,
            "application context ready"
        );

        Ok(Self {
            config: config.clone(),
            session,
            cache,
            api,
            cached,
            auth,
        })
    }

    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(Arc::clone(&self.session))
    }

    /// Writes the cache snapshot if persistence is configured.
    pub async fn persist_cache(&self) -> Result<usize> {
        match &self.config.cache_persist_path {
            Some(path) => self.cache.save_to(path).await,
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_config_restores_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_base_url("http://localhost:3000/api");
        config.storage_path = Some(dir.path().join("storage.json"));
        config.cache_persist_path = Some(dir.path().join("cache.json"));

        let first = AppContext::from_config(&config).await.unwrap();
        first
            .cache
            .set("/brands", json!(["acme"]), CachePolicy::minutes(60, 720, 1440, true))
            .await;
        assert_eq!(first.persist_cache().await.unwrap(), 1);

        let second = AppContext::from_config(&config).await.unwrap();
        assert_eq!(second.cache.get("/brands").await, Some(json!(["acme"])));
    }

    #[tokio::test]
    async fn test_persist_without_path_is_noop() {
        let config = Config::with_base_url("http://localhost:3000/api");
        let context = AppContext::from_config(&config).await.unwrap();
        assert_eq!(context.persist_cache().await.unwrap(), 0);
    }
}
