//! Session Manager
//!
//! Process-wide holder of the auth tokens, the signed-in user and the admin
//! impersonation context. Constructed once and shared through `Arc`.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::models::User;
use crate::session::AuthTokenSet;
use crate::storage::KeyValueStore;

/// Storage key for the customer an admin is acting as.
pub const IMPERSONATION_KEY: &str = "admin-impersonation:customer-id";

// == Auth State ==
/// What protected views should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Tokens exist but the user has not been confirmed yet
    Loading,
    Authenticated(User),
    Unauthenticated,
}

// == Session Manager ==
pub struct SessionManager {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    tokens: RwLock<Option<AuthTokenSet>>,
    user: RwLock<Option<User>>,
    impersonation: RwLock<Option<String>>,
    state: watch::Sender<AuthState>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Loads persisted tokens and impersonation context from `storage`.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let tokens = AuthTokenSet::load(storage.as_ref()).unwrap_or_else(|err| {
            warn!(error = %err, "could not read persisted tokens");
            None
        });
        let impersonation = storage.get(IMPERSONATION_KEY).filter(|id| !id.is_empty());
        let initial = if tokens.is_some() {
            AuthState::Loading
        } else {
            AuthState::Unauthenticated
        };

        debug!(
            has_tokens = tokens.is_some(),
            impersonating = impersonation.is_some(),
            "session initialized"
        );

        let (state, _) = watch::channel(initial);
        Self {
            storage,
            clock,
            tokens: RwLock::new(tokens),
            user: RwLock::new(None),
            impersonation: RwLock::new(impersonation),
            state,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Tokens ==
    pub async fn tokens(&self) -> Option<AuthTokenSet> {
        self.tokens.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    pub async fn has_tokens(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// True when the access token carries an expiry that has passed.
    pub async fn access_token_expired(&self) -> bool {
        let now = self.now_ms();
        self.tokens
            .read()
            .await
            .as_ref()
            .is_some_and(|t| t.is_expired(now))
    }

    /// Persists and installs a new token set.
    pub async fn store_tokens(&self, tokens: AuthTokenSet) -> Result<()> {
        tokens.save(self.storage.as_ref())?;
        *self.tokens.write().await = Some(tokens);
        Ok(())
    }

    /// Drops tokens and user; the session becomes unauthenticated.
    pub async fn clear_tokens(&self) {
        if let Err(err) = AuthTokenSet::clear(self.storage.as_ref()) {
            warn!(error = %err, "could not remove persisted tokens");
        }
        *self.tokens.write().await = None;
        *self.user.write().await = None;
        self.state.send_replace(AuthState::Unauthenticated);
        info!("session tokens cleared");
    }

    // == User ==
    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub async fn set_user(&self, user: User) {
        *self.user.write().await = Some(user.clone());
        self.state.send_replace(AuthState::Authenticated(user));
    }

    /// Resolves a pending `Loading` state without touching tokens.
    pub fn mark_unauthenticated(&self) {
        self.state.send_replace(AuthState::Unauthenticated);
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), AuthState::Authenticated(_))
    }

    // == Impersonation ==
    pub async fn impersonated_customer(&self) -> Option<String> {
        self.impersonation.read().await.clone()
    }

    pub async fn impersonate(&self, customer_id: &str) -> Result<()> {
        self.storage.set(IMPERSONATION_KEY, customer_id)?;
        *self.impersonation.write().await = Some(customer_id.to_string());
        info!(customer_id, "impersonation started");
        Ok(())
    }

    pub async fn stop_impersonating(&self) -> Result<()> {
        self.storage.remove(IMPERSONATION_KEY)?;
        *self.impersonation.write().await = None;
        info!("impersonation stopped");
        Ok(())
    }

    /// Customer whose data requests currently belong to: the impersonated
    /// customer when set, otherwise the signed-in user's own.
    pub async fn tenant_id(&self) -> Option<String> {
        if let Some(customer) = self.impersonation.read().await.clone() {
            return Some(customer);
        }
        self.user
            .read()
            .await
            .as_ref()
            .and_then(|u| u.customer_id.clone())
    }
}
