//! Auth session
//!
//! Tokens, the signed-in user, admin impersonation and the services that
//! change them.

pub mod auth;
pub mod guard;
pub mod manager;
pub mod tokens;

pub use auth::AuthService;
pub use guard::{GuardDecision, RouteGuard, LOGIN_ROUTE};
pub use manager::{AuthState, SessionManager, IMPERSONATION_KEY};
pub use tokens::{AuthTokenSet, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY};
