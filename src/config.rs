//! Configuration Module
//!
//! Loads client configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::cache::DEFAULT_MAX_ENTRIES;

/// Base URL used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Endpoint fragments that get the long-running timeout.
pub const DEFAULT_LONG_RUNNING_ENDPOINTS: &[&str] = &["/analyze", "/generate", "/export"];

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend origin plus API prefix, no trailing slash
    pub api_base_url: String,
    /// Default request timeout in seconds
    pub request_timeout: u64,
    /// Timeout in seconds for long-running endpoints
    pub long_running_timeout: u64,
    /// Endpoint fragments that mark a request as long-running
    pub long_running_endpoints: Vec<String>,
    /// Capacity bound of the response cache, 0 = unbounded
    pub cache_max_entries: usize,
    /// Background cleanup interval in seconds
    pub cleanup_interval: u64,
    /// File backing tokens and impersonation context; in-memory when unset
    pub storage_path: Option<PathBuf>,
    /// File for the persisted cache snapshot; persistence disabled when unset
    pub cache_persist_path: Option<PathBuf>,
    /// Fixed `x-timezone-offset` value; the local offset when unset
    pub timezone_offset_minutes: Option<i32>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `API_BASE_URL` - Backend API base URL
    /// - `APP_ORIGIN` - Origin the client is served from, used for auto-detection
    /// - `REQUEST_TIMEOUT` - Default timeout in seconds (default: 60)
    /// - `LONG_RUNNING_TIMEOUT` - Long-running timeout in seconds (default: 90)
    /// - `LONG_RUNNING_ENDPOINTS` - Comma separated endpoint fragments
    /// - `CACHE_MAX_ENTRIES` - Cache capacity (default: 500)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `STORAGE_PATH` - Token storage file
    /// - `CACHE_PERSIST_PATH` - Cache snapshot file
    /// - `TIMEZONE_OFFSET_MINUTES` - Override for the timezone header
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_override = non_empty_var("API_BASE_URL");
        let origin = non_empty_var("APP_ORIGIN");

        Self {
            api_base_url: resolve_api_base_url(api_override.as_deref(), origin.as_deref()),
            request_timeout: parsed_var("REQUEST_TIMEOUT").unwrap_or(defaults.request_timeout),
            long_running_timeout: parsed_var("LONG_RUNNING_TIMEOUT")
                .unwrap_or(defaults.long_running_timeout),
            long_running_endpoints: non_empty_var("LONG_RUNNING_ENDPOINTS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.long_running_endpoints),
            cache_max_entries: parsed_var("CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries),
            cleanup_interval: parsed_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            storage_path: non_empty_var("STORAGE_PATH").map(PathBuf::from),
            cache_persist_path: non_empty_var("CACHE_PERSIST_PATH").map(PathBuf::from),
            timezone_offset_minutes: parsed_var("TIMEZONE_OFFSET_MINUTES"),
        }
    }

    /// Config pointing at `api_base_url` with every other value defaulted.
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: trim_base(&api_base_url.into()),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn long_running_timeout(&self) -> Duration {
        Duration::from_secs(self.long_running_timeout)
    }

    /// Timeout for `endpoint` when the caller does not set one.
    pub fn timeout_for(&self, endpoint: &str) -> Duration {
        if self
            .long_running_endpoints
            .iter()
            .any(|fragment| endpoint.contains(fragment.as_str()))
        {
            self.long_running_timeout()
        } else {
            self.request_timeout()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: 60,
            long_running_timeout: 90,
            long_running_endpoints: DEFAULT_LONG_RUNNING_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval: 60,
            storage_path: None,
            cache_persist_path: None,
            timezone_offset_minutes: None,
        }
    }
}

// == Base URL Resolution ==
/// Picks the API base URL.
///
/// An explicit override wins, except that a localhost override is ignored
/// when the client runs on a non-local origin, so a development value baked
/// into a production build cannot point real users at their own machine.
/// Without an override the API is assumed to live at `<origin>/api`.
pub fn resolve_api_base_url(override_url: Option<&str>, origin: Option<&str>) -> String {
    let production_origin = origin.filter(|o| !is_local_url(o));

    if let Some(candidate) = override_url {
        if is_local_url(candidate) && production_origin.is_some() {
            warn!(
                override_url = candidate,
                origin = production_origin.unwrap_or_default(),
                "ignoring localhost API override on a production origin"
            );
        } else {
            return trim_base(candidate);
        }
    }

    match origin {
        Some(origin) => format!("{}/api", trim_base(origin)),
        None => DEFAULT_API_BASE_URL.to_string(),
    }
}

fn is_local_url(raw: &str) -> bool {
    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .map(|host| {
            host == "localhost"
                || host == "0.0.0.0"
                || host == "[::1]"
                || host.starts_with("127.")
                || host.ends_with(".localhost")
        })
        .unwrap_or(false)
}

fn trim_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    non_empty_var(name).and_then(|v| v.trim().parse().ok())
}
