//! Authentication DTOs
//!
//! Request bodies sent to the auth endpoints and the payloads they return.
//! Field aliases accept both snake_case and camelCase from the backend.

use serde::{Deserialize, Serialize};

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Tenant the user's data belongs to
    #[serde(default, alias = "customerId")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("admin"))
    }
}

/// Body for `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body for `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "companyName")]
    pub company_name: Option<String>,
}

impl RegisterRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if !self.email.contains('@') {
            return Some("Email address is not valid".to_string());
        }
        if self.password.len() < 8 {
            return Some("Password must be at least 8 characters".to_string());
        }
        None
    }
}

/// Body for `POST /auth/refresh`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token fields returned by login, register and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default, alias = "expiresIn")]
    pub expires_in: Option<u64>,
    /// Absolute expiry in Unix milliseconds
    #[serde(default, alias = "expiresAt")]
    pub expires_at: Option<u64>,
}

/// Login / register payload: tokens plus the user they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthPayload {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    #[serde(default)]
    pub user: Option<User>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_accepts_camel_case() {
        let tokens: TokenResponse = serde_json::from_value(json!({
            "accessToken": "a",
            "refreshToken": "r",
            "expiresIn": 3600
        }))
        .unwrap();
        assert_eq!(tokens.access_token, "a");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[test]
    fn test_auth_payload_flattens_tokens() {
        let payload: AuthPayload = serde_json::from_value(json!({
            "access_token": "a",
            "user": {"id": "u1", "email": "x@y.z", "customerId": "cust-1", "role": "admin"}
        }))
        .unwrap();
        let user = payload.user.unwrap();
        assert_eq!(user.customer_id.as_deref(), Some("cust-1"));
        assert!(user.is_admin());
        assert!(payload.tokens.refresh_token.is_none());
    }

    #[test]
    fn test_register_validation() {
        let mut req = RegisterRequest {
            email: "bad".into(),
            password: "longenough".into(),
            name: None,
            company_name: None,
        };
        assert!(req.validate().is_some());
        req.email = "ok@example.com".into();
        assert!(req.validate().is_none());
        req.password = "short".into();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_register_skips_empty_optionals() {
        let req = RegisterRequest {
            email: "a@b.c".into(),
            password: "password1".into(),
            name: None,
            company_name: Some("Acme".into()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("name").is_none());
        assert_eq!(json["companyName"], "Acme");
    }
}
