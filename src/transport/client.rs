//! API Client
//!
//! One authenticated HTTP call: headers, timeout/abort merging, and a single
//! refresh-and-replay when the backend reports an expired session.

use std::fmt;
use std::sync::Arc;

use chrono::Local;
use futures::future::FutureExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::{error_message_from_body, unwrap_envelope, RefreshRequest, TokenResponse};
use crate::session::{AuthTokenSet, SessionManager};
use crate::transport::abort::RequestDeadline;
use crate::transport::classify::UnauthorizedBody;
use crate::transport::refresh::RefreshGate;
use crate::transport::{RequestConfig, RequestOptions};

pub const REFRESH_PATH: &str = "/auth/refresh";
pub const TIMEZONE_HEADER: &str = "x-timezone-offset";
pub const IMPERSONATE_HEADER: &str = "X-Impersonate-Customer";

const USER_AGENT_VALUE: &str = concat!("visibility-client/", env!("CARGO_PKG_VERSION"));

/// Minutes to add to local time to get UTC (UTC+2 gives -120).
pub fn local_timezone_offset() -> i32 {
    -(Local::now().offset().local_minus_utc() / 60)
}

/// Status, content type and body text of a finished response.
struct RawResponse {
    status: StatusCode,
    content_type: Option<String>,
    text: String,
}

impl RawResponse {
    fn error_message(&self) -> String {
        serde_json::from_str::<Value>(&self.text)
            .ok()
            .as_ref()
            .and_then(error_message_from_body)
            .unwrap_or_else(|| format!("Request failed with status {}", self.status.as_u16()))
    }

    /// Parsed JSON body; non-JSON or empty bodies become `{}`.
    fn into_value(self) -> Result<Value> {
        let is_json = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
        if !is_json || self.text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&self.text)
            .map_err(|e| ClientError::Decode(format!("invalid JSON response: {}", e)))
    }
}

enum Reply {
    Body(Value),
    /// 401 on an authenticated request, with the token it was sent with
    Unauthorized {
        body: UnauthorizedBody,
        used_token: Option<String>,
    },
}

struct ClientInner {
    http: reqwest::Client,
    config: Config,
    session: Arc<SessionManager>,
    refresh: RefreshGate,
}

// == API Client ==
/// Cheap to clone; clones share the HTTP pool and the refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.api_base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<SessionManager>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?;

        info!(base_url = %config.api_base_url, "API client ready");
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config: config.clone(),
                session,
                refresh: RefreshGate::default(),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.config.api_base_url
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.inner.session
    }

    /// Absolute endpoints pass through; relative ones join the base URL.
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.inner.config.api_base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }

    fn timezone_offset(&self) -> i32 {
        self.inner
            .config
            .timezone_offset_minutes
            .unwrap_or_else(local_timezone_offset)
    }

    // == Requests ==
    /// Sends one request and returns the parsed JSON body.
    ///
    /// A 401 whose body reports an expired or invalid session triggers one
    /// token refresh and one replay with `retry` off. If that does not
    /// recover, tokens are cleared and `SessionExpired` is returned. Other
    /// 401s leave the session alone.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
        config: RequestConfig,
    ) -> Result<Value> {
        let mut config = config;
        loop {
            let (body, used_token) = match self.send(endpoint, &options, &config).await? {
                Reply::Body(value) => return Ok(value),
                Reply::Unauthorized { body, used_token } => (body, used_token),
            };

            if !body.is_session_error() {
                debug!(endpoint, message = %body.message, "401 not related to the session");
                return Err(ClientError::Http {
                    status: 401,
                    message: body.message,
                });
            }

            if config.retry {
                match self.refresh_tokens(used_token.as_deref()).await {
                    Ok(()) => {
                        debug!(endpoint, "replaying request after token refresh");
                        config.retry = false;
                        continue;
                    }
                    Err(err) => warn!(endpoint, error = %err, "token refresh failed"),
                }
            }

            warn!(endpoint, message = %body.message, "session rejected, signing out");
            self.inner.session.clear_tokens().await;
            return Err(ClientError::SessionExpired(body.message));
        }
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(endpoint, RequestOptions::get(), RequestConfig::default())
            .await
    }

    /// GET decoded through the response envelope.
    pub async fn get_data<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        unwrap_envelope(self.get(endpoint).await?)
    }

    /// POST decoded through the response envelope.
    pub async fn post_data<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Value,
        config: RequestConfig,
    ) -> Result<T> {
        unwrap_envelope(
            self.request(endpoint, RequestOptions::post(body), config)
                .await?,
        )
    }

    async fn send(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        config: &RequestConfig,
    ) -> Result<Reply> {
        let timeout = config
            .timeout
            .unwrap_or_else(|| self.inner.config.timeout_for(endpoint));
        let deadline = RequestDeadline::new(options.signal.as_ref(), timeout);

        deadline.check()?;

        let token = if config.requires_auth {
            if self.inner.session.access_token_expired().await {
                match deadline.run(self.refresh_tokens(None)).await {
                    Ok(()) => {}
                    Err(ClientError::Aborted) => return Err(ClientError::Aborted),
                    Err(err) => debug!(error = %err, "proactive token refresh failed"),
                }
            }
            let token = self.inner.session.access_token().await.ok_or_else(|| {
                ClientError::Authentication("No access token available".to_string())
            })?;
            Some(token)
        } else {
            None
        };

        let url = self.url_for(endpoint);
        let mut builder = self.base_request(options.method.clone(), &url).await;
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        debug!(method = %options.method, url = %url, timeout_secs = timeout.as_secs(), "sending request");
        let raw = self.dispatch(&url, builder, &deadline).await?;

        if raw.status == StatusCode::UNAUTHORIZED && config.requires_auth {
            return Ok(Reply::Unauthorized {
                body: UnauthorizedBody::parse(&raw.text),
                used_token: token,
            });
        }
        if !raw.status.is_success() {
            let message = raw.error_message();
            warn!(url = %url, status = raw.status.as_u16(), message = %message, "request failed");
            return Err(ClientError::Http {
                status: raw.status.as_u16(),
                message,
            });
        }
        Ok(Reply::Body(raw.into_value()?))
    }

    /// Builder with the headers every request carries.
    async fn base_request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self
            .inner
            .http
            .request(method, url)
            .header(TIMEZONE_HEADER, self.timezone_offset().to_string());
        if let Some(customer) = self.inner.session.impersonated_customer().await {
            builder = builder.header(IMPERSONATE_HEADER, customer);
        }
        builder
    }

    async fn dispatch(
        &self,
        url: &str,
        builder: RequestBuilder,
        deadline: &RequestDeadline,
    ) -> Result<RawResponse> {
        deadline
            .run(async {
                let response = builder.send().await.map_err(|e| network_error(url, &e))?;
                let status = response.status();
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let text = response.text().await.map_err(|e| network_error(url, &e))?;
                Ok::<_, ClientError>(RawResponse {
                    status,
                    content_type,
                    text,
                })
            })
            .await
    }

    // == Token Refresh ==
    /// Exchanges the refresh token for a new access token.
    ///
    /// Concurrent callers share one refresh. When `used_token` is given and
    /// the session already holds a different access token, another caller
    /// refreshed in the meantime and nothing is sent.
    pub async fn refresh_tokens(&self, used_token: Option<&str>) -> Result<()> {
        if let (Some(used), Some(current)) =
            (used_token, self.inner.session.access_token().await)
        {
            if used != current {
                debug!("access token already rotated, skipping refresh");
                return Ok(());
            }
        }

        let client = self.clone();
        self.inner
            .refresh
            .run(move || async move { client.perform_refresh().await }.boxed())
            .await
    }

    async fn perform_refresh(&self) -> Result<()> {
        let session = &self.inner.session;
        let refresh_token = session.refresh_token().await.ok_or_else(|| {
            ClientError::SessionExpired("No refresh token available".to_string())
        })?;

        let url = self.url_for(REFRESH_PATH);
        let builder = self
            .base_request(Method::POST, &url)
            .await
            .json(&RefreshRequest {
                refresh_token: refresh_token.clone(),
            });
        let deadline = RequestDeadline::new(None, self.inner.config.request_timeout());
        let raw = self.dispatch(&url, builder, &deadline).await?;

        if !raw.status.is_success() {
            return Err(ClientError::SessionExpired(raw.error_message()));
        }
        let response: TokenResponse = unwrap_envelope(raw.into_value()?)?;
        let tokens = AuthTokenSet::from_response(response, Some(refresh_token), session.now_ms());
        session.store_tokens(tokens).await?;

        info!("access token refreshed");
        Ok(())
    }
}

fn network_error(url: &str, err: &reqwest::Error) -> ClientError {
    if err.is_builder() {
        return ClientError::Config(format!("invalid request to {}: {}", url, err));
    }
    ClientError::Network(format!(
        "Unable to reach the API at {} ({}). The backend may be down, or the request was blocked by a proxy, CORS policy or firewall",
        url, err
    ))
}
