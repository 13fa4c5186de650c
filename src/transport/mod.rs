//! HTTP transport
//!
//! Authenticated calls to the backend with timeout, abort handling and
//! session refresh.

pub mod abort;
pub mod classify;
pub mod client;
pub mod options;
mod refresh;

pub use abort::RequestDeadline;
pub use classify::{is_session_auth_error, UnauthorizedBody};
pub use client::{local_timezone_offset, ApiClient, IMPERSONATE_HEADER, REFRESH_PATH, TIMEZONE_HEADER};
pub use options::{RequestConfig, RequestOptions};
pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;
