//! Single-flight gate for token refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

type SharedRefresh = Shared<BoxFuture<'static, Result<()>>>;

/// At most one refresh runs at a time; later callers join it.
#[derive(Default)]
pub(crate) struct RefreshGate {
    slot: Arc<Mutex<Option<(u64, SharedRefresh)>>>,
    next_id: AtomicU64,
}

impl RefreshGate {
    /// Joins the in-flight refresh, or starts one with `start`.
    pub(crate) async fn run<F>(&self, start: F) -> Result<()>
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>>,
    {
        let shared = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some((_, inflight)) => {
                    debug!("joining in-flight token refresh");
                    inflight.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let registry = Arc::clone(&self.slot);
                    let refresh = start();
                    let shared = async move {
                        let result = refresh.await;
                        let mut slot = registry.lock().await;
                        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
                            *slot = None;
                        }
                        result
                    }
                    .boxed()
                    .shared();

                    *slot = Some((id, shared.clone()));
                    tokio::spawn(shared.clone().map(|_| ()));
                    shared
                }
            }
        };
        shared.await
    }
}
