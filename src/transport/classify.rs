//! Session-auth classification of 401 responses.
//!
//! An upstream 401 (a third-party key the backend forwards, a permission
//! check) must not log the user out, so only bodies that actually talk about
//! the session count.

use serde_json::Value;

use crate::models::error_message_from_body;

/// Structured `code` values that always mean the session is gone.
pub const SESSION_ERROR_CODES: &[&str] = &[
    "TOKEN_EXPIRED",
    "SESSION_EXPIRED",
    "INVALID_TOKEN",
    "AUTH_REQUIRED",
];

/// Lower-case phrases that mark a 401 message as a session failure.
pub const SESSION_ERROR_PHRASES: &[&str] = &[
    "token expired",
    "token has expired",
    "expired token",
    "jwt expired",
    "jwt malformed",
    "invalid jwt",
    "invalid token",
    "token is invalid",
    "invalid signature",
    "session expired",
    "session has expired",
    "invalid session",
    "session not found",
    "not authenticated",
    "authentication required",
    "authentication failed",
    "no token provided",
    "missing token",
];

/// A 401 response reduced to what classification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnauthorizedBody {
    pub message: String,
    pub code: Option<String>,
}

impl UnauthorizedBody {
    /// Reads `error`/`message` and `code` from a JSON body, falling back to
    /// the raw text and then to "Unauthorized".
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(body) => {
                let code = body.get("code").and_then(Value::as_str).map(str::to_string);
                let message = error_message_from_body(&body)
                    .unwrap_or_else(|| fallback_message(text, &body));
                Self { message, code }
            }
            Err(_) => Self {
                message: non_empty_or_default(text),
                code: None,
            },
        }
    }

    pub fn is_session_error(&self) -> bool {
        is_session_auth_error(&self.message, self.code.as_deref())
    }
}

fn fallback_message(text: &str, body: &Value) -> String {
    match body {
        Value::String(s) => non_empty_or_default(s),
        Value::Object(_) | Value::Null => "Unauthorized".to_string(),
        _ => non_empty_or_default(text),
    }
}

fn non_empty_or_default(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "Unauthorized".to_string()
    } else {
        trimmed.to_string()
    }
}

/// True when a 401 means the session itself is no longer valid.
pub fn is_session_auth_error(message: &str, code: Option<&str>) -> bool {
    if code.is_some_and(|c| SESSION_ERROR_CODES.iter().any(|k| c.eq_ignore_ascii_case(k))) {
        return true;
    }
    let lowered = message.to_ascii_lowercase();
    SESSION_ERROR_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrases_are_case_insensitive() {
        assert!(is_session_auth_error("Token Expired", None));
        assert!(is_session_auth_error("JWT expired at 2024-01-01", None));
        assert!(is_session_auth_error("Invalid token supplied", None));
    }

    #[test]
    fn test_plain_unauthorized_is_not_session() {
        assert!(!is_session_auth_error("Unauthorized", None));
        assert!(!is_session_auth_error("OpenAI key rejected", None));
    }

    #[test]
    fn test_structured_code_wins() {
        assert!(is_session_auth_error("nope", Some("TOKEN_EXPIRED")));
        assert!(is_session_auth_error("nope", Some("session_expired")));
        assert!(!is_session_auth_error("nope", Some("FORBIDDEN_UPSTREAM")));
    }

    #[test]
    fn test_parse_json_body() {
        let body = UnauthorizedBody::parse(r#"{"error":"Session expired","code":"X"}"#);
        assert_eq!(body.message, "Session expired");
        assert_eq!(body.code.as_deref(), Some("X"));
        assert!(body.is_session_error());
    }

    #[test]
    fn test_parse_raw_and_empty_text() {
        assert_eq!(UnauthorizedBody::parse("jwt expired").message, "jwt expired");
        assert_eq!(UnauthorizedBody::parse("").message, "Unauthorized");
        assert_eq!(UnauthorizedBody::parse("{}").message, "Unauthorized");
    }
}
