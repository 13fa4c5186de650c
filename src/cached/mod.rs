//! Cached requests
//!
//! Policy-driven wrapper that answers from the cache when it can and keeps
//! entries fresh in the background.

mod swr;

pub use swr::{CachedClient, CachedRequestOptions};
