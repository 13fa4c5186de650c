//! Per-request options.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// What to send.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Caller cancellation
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self::with_method(Method::POST).with_body(body)
    }

    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Same request, detached from the caller's cancellation.
    pub fn detached(&self) -> Self {
        Self {
            signal: None,
            ..self.clone()
        }
    }
}

/// How to send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestConfig {
    pub requires_auth: bool,
    /// Allow one refresh-and-replay on a session 401
    pub retry: bool,
    /// Overrides the endpoint-derived timeout
    pub timeout: Option<Duration>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            requires_auth: true,
            retry: true,
            timeout: None,
        }
    }
}

impl RequestConfig {
    /// No token attached, no session handling.
    pub fn public() -> Self {
        Self {
            requires_auth: false,
            ..Self::default()
        }
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
