//! Storage Module
//!
//! Small string key/value persistence used for tokens and the admin
//! impersonation context. Mirrors the browser's local storage contract.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::fmt::Debug;

use crate::error::Result;

/// Synchronous string key/value store.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Reads a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}
