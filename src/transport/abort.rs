//! Abort / timeout merging for a single request.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Caller cancellation merged with an internal deadline.
///
/// The internal token is a child of the caller's, so cancelling the caller
/// cancels the request; the deadline cancels only the internal token.
#[derive(Debug)]
pub struct RequestDeadline {
    token: CancellationToken,
    caller: Option<CancellationToken>,
    timeout: Duration,
}

impl RequestDeadline {
    pub fn new(caller: Option<&CancellationToken>, timeout: Duration) -> Self {
        let token = caller.map(CancellationToken::child_token).unwrap_or_default();
        Self {
            token,
            caller: caller.cloned(),
            timeout,
        }
    }

    /// Fails with `Aborted` if the caller already gave up.
    pub fn check(&self) -> Result<()> {
        if self.caller_cancelled() {
            Err(ClientError::Aborted)
        } else {
            Ok(())
        }
    }

    fn caller_cancelled(&self) -> bool {
        self.caller
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn reason(&self) -> ClientError {
        if self.caller_cancelled() {
            ClientError::Aborted
        } else {
            ClientError::Timeout {
                after: self.timeout,
            }
        }
    }

    /// Runs `fut` until it finishes, the caller cancels or the deadline fires.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.reason()),
            _ = tokio::time::sleep(self.timeout) => {
                self.token.cancel();
                Err(self.reason())
            }
            result = fut => result,
        }
    }
}
