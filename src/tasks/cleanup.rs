//! Cache Maintenance Task
//!
//! Periodically purges entries past their max age and, when a snapshot path
//! is configured, flushes persisted entries to disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;

/// Spawns the maintenance loop.
///
/// # Arguments
/// * `cache` - Shared cache manager
/// * `interval_secs` - Seconds between runs
/// * `persist_path` - Where to write the snapshot after each run, if anywhere
///
/// # Returns
/// A JoinHandle the caller aborts on shutdown.
pub fn spawn_cleanup_task(
    cache: Arc<CacheManager>,
    interval_secs: u64,
    persist_path: Option<PathBuf>,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting cache maintenance task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired().await;
            if removed > 0 {
                info!("Cache maintenance: removed {} expired entries", removed);
            } else {
                debug!("Cache maintenance: no expired entries found");
            }

            if let Some(path) = &persist_path {
                match cache.save_to(path).await {
                    Ok(saved) => debug!(path = %path.display(), saved, "cache snapshot flushed"),
                    Err(err) => warn!(path = %path.display(), error = %err, "cache snapshot failed"),
                }
            }
        }
    })
}
