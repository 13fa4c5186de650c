//! Stale-while-revalidate request wrapper.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{
    generate_cache_key, CacheManager, CachePolicy, CacheStats, Freshness, ParsedEndpoint,
    PolicyTable, SharedFetch,
};
use crate::error::{ClientError, Result};
use crate::models::unwrap_envelope;
use crate::transport::{ApiClient, RequestConfig, RequestOptions};

/// Options for one cached call.
#[derive(Debug, Clone, Default)]
pub struct CachedRequestOptions {
    pub request: RequestOptions,
    pub config: RequestConfig,
    /// Replaces the policy resolved from the endpoint
    pub policy: Option<CachePolicy>,
}

impl CachedRequestOptions {
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.request.signal = Some(signal);
        self
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

// == Cached Client ==
#[derive(Debug, Clone)]
pub struct CachedClient {
    api: ApiClient,
    cache: Arc<CacheManager>,
    policies: Arc<PolicyTable>,
}

impl CachedClient {
    pub fn new(api: ApiClient, cache: Arc<CacheManager>, policies: PolicyTable) -> Self {
        Self {
            api,
            cache,
            policies: Arc::new(policies),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Key `endpoint` is cached under for the current tenant.
    pub async fn cache_key(&self, endpoint: &str) -> String {
        self.key_for(&ParsedEndpoint::parse(endpoint)).await
    }

    async fn key_for(&self, parsed: &ParsedEndpoint) -> String {
        let tenant = self.api.session().tenant_id().await;
        generate_cache_key(&parsed.path, &parsed.params, tenant.as_deref())
    }

    /// Serves `endpoint` from cache according to its policy.
    ///
    /// Fresh entries are returned as is. Stale entries are returned while a
    /// background request refreshes them. Anything older goes to the network;
    /// when that fails, a held value is served instead of the error where
    /// possible. Concurrent calls for the same key share one request.
    pub async fn cached_request(
        &self,
        endpoint: &str,
        options: CachedRequestOptions,
    ) -> Result<Value> {
        let parsed = ParsedEndpoint::parse(endpoint);
        if parsed.skip_cache() {
            debug!(endpoint, "cache bypassed");
            return self.api.request(endpoint, options.request, options.config).await;
        }

        let key = self.key_for(&parsed).await;
        let policy = options
            .policy
            .unwrap_or_else(|| self.policies.resolve(&parsed.path));
        let signal = options.request.signal.clone();

        if let Some(inflight) = self.cache.pending(&key).await {
            debug!(key = %key, "joining in-flight request");
            self.cache.record(CacheStats::record_dedup).await;
            return self.settle(&key, inflight, signal.as_ref()).await;
        }

        let held = self.cache.lookup(&key).await;
        match held {
            Some((value, Freshness::Fresh)) => {
                self.cache.record(CacheStats::record_hit).await;
                return Ok(value);
            }
            Some((value, Freshness::Stale)) => {
                self.cache.record(CacheStats::record_stale_hit).await;
                self.revalidate(endpoint, &key, policy, &options).await;
                return Ok(value);
            }
            _ => {}
        }

        if signal.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return match held {
                Some((value, _)) => {
                    debug!(key = %key, "request already aborted, serving held value");
                    self.cache.record(CacheStats::record_fallback).await;
                    Ok(value)
                }
                None => Err(ClientError::Aborted),
            };
        }

        self.cache.record(CacheStats::record_miss).await;
        let fetch = self.fetch_and_store(
            endpoint,
            key.clone(),
            policy,
            options.request,
            options.config,
        );
        let (inflight, started) = self.cache.register_pending(&key, fetch).await;
        if !started {
            self.cache.record(CacheStats::record_dedup).await;
        }
        self.settle(&key, inflight, signal.as_ref()).await
    }

    /// Warms the cache for `endpoint` in the background.
    pub async fn prefetch_request(&self, endpoint: &str) {
        let parsed = ParsedEndpoint::parse(endpoint);
        if parsed.skip_cache() {
            return;
        }
        let key = self.key_for(&parsed).await;
        if self.cache.is_fresh(&key).await || self.cache.pending(&key).await.is_some() {
            debug!(key = %key, "prefetch not needed");
            return;
        }

        let policy = self.policies.resolve(&parsed.path);
        let fetch = self.fetch_and_store(
            endpoint,
            key.clone(),
            policy,
            RequestOptions::get(),
            RequestConfig::default(),
        );
        let (inflight, started) = self.cache.register_pending(&key, fetch).await;
        if started {
            tokio::spawn(async move {
                if let Err(err) = inflight.await {
                    debug!(key = %key, error = %err, "prefetch failed");
                }
            });
        }
    }

    /// `cached_request` decoded through the response envelope.
    pub async fn get_data<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: CachedRequestOptions,
    ) -> Result<T> {
        unwrap_envelope(self.cached_request(endpoint, options).await?)
    }

    /// Drops every cached response whose key contains `prefix`.
    pub async fn invalidate_endpoint(&self, prefix: &str) -> usize {
        self.cache.invalidate_pattern(prefix).await
    }

    async fn revalidate(
        &self,
        endpoint: &str,
        key: &str,
        policy: CachePolicy,
        options: &CachedRequestOptions,
    ) {
        let fetch = self.fetch_and_store(
            endpoint,
            key.to_string(),
            policy,
            options.request.detached(),
            options.config,
        );
        let (inflight, started) = self.cache.register_pending(key, fetch).await;
        if !started {
            debug!(key, "revalidation already in flight");
            return;
        }

        self.cache.record(CacheStats::record_revalidation).await;
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(err) = inflight.await {
                warn!(key = %key, error = %err, "background revalidation failed");
            }
        });
    }

    /// Network request that writes its result into the cache on success.
    fn fetch_and_store(
        &self,
        endpoint: &str,
        key: String,
        policy: CachePolicy,
        request: RequestOptions,
        config: RequestConfig,
    ) -> BoxFuture<'static, Result<Value>> {
        let api = self.api.clone();
        let cache = Arc::clone(&self.cache);
        let endpoint = endpoint.to_string();
        async move {
            let value = api.request(&endpoint, request, config).await?;
            cache.set(&key, value.clone(), policy).await;
            Ok(value)
        }
        .boxed()
    }

    /// Awaits a shared fetch and falls back to held data on failure.
    async fn settle(
        &self,
        key: &str,
        inflight: SharedFetch,
        signal: Option<&CancellationToken>,
    ) -> Result<Value> {
        let result = match signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => Err(ClientError::Aborted),
                result = inflight => result,
            },
            None => inflight.await,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let fallback = if err.is_abort() {
            self.cache.get_any(key).await
        } else {
            self.cache.get(key).await
        };
        match fallback {
            Some(value) => {
                if err.is_abort() {
                    debug!(key, "request aborted, serving held value");
                } else {
                    warn!(key, error = %err, "request failed, serving cached value");
                }
                self.cache.record(CacheStats::record_fallback).await;
                Ok(value)
            }
            None => Err(err),
        }
    }
}
