//! Auth Service
//!
//! Login, registration, logout and admin impersonation. Every change of who
//! the requests belong to clears the response cache.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::error::{ClientError, Result};
use crate::models::{unwrap_envelope, AuthPayload, LoginRequest, RegisterRequest, User};
use crate::session::{AuthState, AuthTokenSet, SessionManager};
use crate::transport::{ApiClient, RequestConfig, RequestOptions};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";

#[derive(Debug, Clone)]
pub struct AuthService {
    api: ApiClient,
    session: Arc<SessionManager>,
    cache: Arc<CacheManager>,
}

impl AuthService {
    pub fn new(api: ApiClient, cache: Arc<CacheManager>) -> Self {
        let session = Arc::clone(api.session());
        Self {
            api,
            session,
            cache,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Confirms persisted tokens with the backend and settles the auth state.
    pub async fn initialize(&self) -> AuthState {
        if !self.session.has_tokens().await {
            self.session.mark_unauthenticated();
            return AuthState::Unauthenticated;
        }

        match self.fetch_user().await {
            Ok(user) => {
                info!(user_id = %user.id, "session restored");
                self.session.set_user(user.clone()).await;
                AuthState::Authenticated(user)
            }
            Err(err) => {
                warn!(error = %err, "could not restore session");
                self.session.mark_unauthenticated();
                AuthState::Unauthenticated
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let body = serde_json::to_value(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let payload: AuthPayload = self
            .api
            .post_data(LOGIN_PATH, body, RequestConfig::public())
            .await?;
        self.establish(payload).await
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User> {
        if let Some(reason) = request.validate() {
            return Err(ClientError::Api(reason));
        }
        let body = serde_json::to_value(&request)?;
        let payload: AuthPayload = self
            .api
            .post_data(REGISTER_PATH, body, RequestConfig::public())
            .await?;
        self.establish(payload).await
    }

    /// Signs out locally even when the backend cannot be reached.
    pub async fn logout(&self) {
        if self.session.has_tokens().await {
            let body = json!({ "refresh_token": self.session.refresh_token().await });
            if let Err(err) = self
                .api
                .request(
                    LOGOUT_PATH,
                    RequestOptions::post(body),
                    RequestConfig::default().no_retry(),
                )
                .await
            {
                debug!(error = %err, "logout request failed");
            }
        }

        self.session.clear_tokens().await;
        if let Err(err) = self.session.stop_impersonating().await {
            warn!(error = %err, "could not clear impersonation context");
        }
        self.cache.clear().await;
        info!("signed out");
    }

    // == Impersonation ==
    /// Acts as `customer_id` for all subsequent requests. Admins only.
    pub async fn impersonate(&self, customer_id: &str) -> Result<()> {
        let is_admin = self
            .session
            .current_user()
            .await
            .is_some_and(|u| u.is_admin());
        if !is_admin {
            return Err(ClientError::Authentication(
                "Only admins can impersonate customers".to_string(),
            ));
        }
        self.session.impersonate(customer_id).await?;
        self.cache.clear().await;
        Ok(())
    }

    pub async fn stop_impersonating(&self) -> Result<()> {
        self.session.stop_impersonating().await?;
        self.cache.clear().await;
        Ok(())
    }

    async fn establish(&self, payload: AuthPayload) -> Result<User> {
        let tokens = AuthTokenSet::from_response(payload.tokens, None, self.session.now_ms());
        self.session.store_tokens(tokens).await?;

        let user = match payload.user {
            Some(user) => user,
            None => self.fetch_user().await?,
        };

        if let Err(err) = self.session.stop_impersonating().await {
            warn!(error = %err, "could not clear impersonation context");
        }
        self.cache.clear().await;
        self.session.set_user(user.clone()).await;
        info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    async fn fetch_user(&self) -> Result<User> {
        let payload: Value = unwrap_envelope(self.api.get(ME_PATH).await?)?;
        user_from_payload(payload)
    }
}

/// `/auth/me` answers either with the user or with `{ "user": ... }`.
fn user_from_payload(payload: Value) -> Result<User> {
    let value = match payload {
        Value::Object(mut obj) if obj.contains_key("user") => {
            obj.remove("user").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(serde_json::from_value(value)?)
}
