//! Background Tasks Module
//!
//! # Tasks
//! - Cache maintenance: purges entries past max age and flushes the snapshot

mod cleanup;

pub use cleanup::spawn_cleanup_task;
