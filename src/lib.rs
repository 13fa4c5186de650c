//! Visibility Client - stale-while-revalidate API client
//!
//! Talks to the brand visibility dashboard backend: authenticated transport
//! with session refresh, a policy-driven response cache with in-flight
//! de-duplication, and the auth session behind both.

pub mod cache;
pub mod cached;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod transport;

pub use cache::{CacheManager, CachePolicy, PolicyTable};
pub use cached::{CachedClient, CachedRequestOptions};
pub use config::Config;
pub use context::AppContext;
pub use error::{ClientError, Result};
pub use session::{AuthService, AuthState, RouteGuard, SessionManager};
pub use tasks::spawn_cleanup_task;
pub use transport::{ApiClient, RequestConfig, RequestOptions};
