//! Auth token set and its persisted form.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::models::TokenResponse;
use crate::storage::KeyValueStore;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRES_AT_KEY: &str = "access_token_expires_at";

/// Older key names still found in long-lived installs, mapped to the
/// canonical key that replaced them.
pub const DEPRECATED_TOKEN_KEYS: &[(&str, &str)] = &[
    ("token", ACCESS_TOKEN_KEY),
    ("authToken", ACCESS_TOKEN_KEY),
    ("refreshToken", REFRESH_TOKEN_KEY),
    ("tokenExpiresAt", EXPIRES_AT_KEY),
];

// == Auth Token Set ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix milliseconds, `None` when the backend did not say
    pub expires_at: Option<u64>,
}

impl AuthTokenSet {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: None,
        }
    }

    /// Builds a token set from a login/refresh response.
    ///
    /// The previous refresh token is kept when the response does not rotate
    /// it. `expires_at` wins over `expires_in` when both are present.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<String>,
        now_ms: u64,
    ) -> Self {
        let expires_at = response.expires_at.or_else(|| {
            response
                .expires_in
                .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)))
        });
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at,
        }
    }

    /// True once `expires_at` has passed. Unknown expiry never expires.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms >= at)
    }

    // == Persistence ==
    /// Reads the token set, migrating deprecated keys first.
    pub fn load(store: &dyn KeyValueStore) -> Result<Option<Self>> {
        migrate_deprecated_keys(store)?;

        let Some(access_token) = store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let refresh_token = store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty());
        let expires_at = store
            .get(EXPIRES_AT_KEY)
            .and_then(|raw| raw.trim().parse::<u64>().ok());

        Ok(Some(Self {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set(ACCESS_TOKEN_KEY, &self.access_token)?;
        match &self.refresh_token {
            Some(refresh) => store.set(REFRESH_TOKEN_KEY, refresh)?,
            None => store.remove(REFRESH_TOKEN_KEY)?,
        }
        match self.expires_at {
            Some(at) => store.set(EXPIRES_AT_KEY, &at.to_string())?,
            None => store.remove(EXPIRES_AT_KEY)?,
        }
        Ok(())
    }

    /// Removes canonical and deprecated token keys.
    pub fn clear(store: &dyn KeyValueStore) -> Result<()> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY] {
            store.remove(key)?;
        }
        for (old, _) in DEPRECATED_TOKEN_KEYS {
            store.remove(old)?;
        }
        Ok(())
    }
}

/// Copies deprecated keys onto their canonical names (unless already set)
/// and deletes them. Returns how many keys were migrated.
fn migrate_deprecated_keys(store: &dyn KeyValueStore) -> Result<usize> {
    let mut migrated = 0;
    for (old, canonical) in DEPRECATED_TOKEN_KEYS {
        let Some(value) = store.get(old) else {
            continue;
        };
        if store.get(canonical).is_none() && !value.is_empty() {
            store.set(canonical, &value)?;
            migrated += 1;
        } else {
            warn!(key = old, "dropping deprecated token key shadowed by {}", canonical);
        }
        store.remove(old)?;
    }
    if migrated > 0 {
        info!(migrated, "migrated deprecated token storage keys");
    }
    Ok(migrated)
}
