//! Error types for the API client
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

// == Client Error Enum ==
/// Unified error type for the API client.
///
/// Cloneable so a single failure can be handed to every caller awaiting the
/// same shared in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Authentication required but no access token is available
    #[error("Authentication required: {0}")]
    Authentication(String),

    /// Backend rejected the session and the token refresh did not recover it
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The request never reached the backend
    #[error("Network error: {0}")]
    Network(String),

    /// The internal deadline fired before a response arrived
    #[error("Request timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// Caller cancelled the request
    #[error("Request aborted")]
    Aborted,

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Envelope reported `success: false`
    #[error("API error: {0}")]
    Api(String),

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Local persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True for caller-initiated cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }

    /// True when the failure means the user has to sign in again.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ClientError::Authentication(_) | ClientError::SessionExpired(_)
        )
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::SessionExpired(_) => Some(401),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the API client.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_duration() {
        let err = ClientError::Timeout {
            after: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "Request timed out after 90s");
    }

    #[test]
    fn test_classification_helpers() {
        assert!(ClientError::Aborted.is_abort());
        assert!(ClientError::SessionExpired("x".into()).is_auth());
        assert!(ClientError::Authentication("x".into()).is_auth());
        assert!(!ClientError::Network("x".into()).is_auth());
        assert_eq!(
            ClientError::Http {
                status: 503,
                message: "down".into()
            }
            .status(),
            Some(503)
        );
    }

    #[test]
    fn test_from_serde_error() {
        let err: ClientError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
