//! Request and Response models for the backend API
//!
//! This module defines the DTOs (Data Transfer Objects) exchanged with the
//! backend and the envelope every response is wrapped in.

pub mod auth;
pub mod envelope;

// Re-export commonly used types
pub use auth::{AuthPayload, LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, User};
pub use envelope::{error_message_from_body, unwrap_envelope, ApiEnvelope};
