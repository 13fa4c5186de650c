//! Gate for protected views.

use std::sync::Arc;

use crate::models::User;
use crate::session::{AuthState, SessionManager};

pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render(User),
    RedirectToLogin,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: Arc<SessionManager>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Waits until the session is no longer `Loading`, then decides.
    pub async fn check(&self) -> GuardDecision {
        let mut state = self.session.subscribe();
        let settled = state
            .wait_for(|s| *s != AuthState::Loading)
            .await
            .map(|s| s.clone());

        match settled {
            Ok(AuthState::Authenticated(user)) => GuardDecision::Render(user),
            _ => GuardDecision::RedirectToLogin,
        }
    }
}
