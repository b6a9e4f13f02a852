//! A background loop that refreshes a time-bounded credential before it
//! expires. Runs independently of the session's connection state.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::SessionError;
use crate::sleeper::Sleeper;

/// Handle to a running credential refresher. Dropping it does not stop the
/// task — call [`CredentialRefresherHandle::stop`] and await it to guarantee
/// the task has actually exited.
pub struct CredentialRefresherHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl CredentialRefresherHandle {
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// Spawns the refresh loop. `refresh` is expected to be the session handler's
/// own `refresh_sas`, already gated and retried like any other operation —
/// this loop only owns the expiry bookkeeping and the wait, not the retry
/// policy. If a refresh ultimately fails for a reason other than
/// cancellation, the loop logs and exits: a refresh that Retry Engine could
/// not recover from will not start succeeding on a tight immediate retry.
pub fn spawn<F, Fut>(
    initial_expiry: SystemTime,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    refresh: F,
    parent_cancel: &CancellationToken,
) -> CredentialRefresherHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SystemTime, SessionError>> + Send,
{
    let cancel = parent_cancel.child_token();
    let join = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let mut expires_at = initial_expiry;
            loop {
                let wait = expires_at.duration_since(clock.now()).unwrap_or(Duration::ZERO);
                if !wait.is_zero() {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            tracing::debug!("credential refresher cancelled while waiting");
                            return;
                        }
                        () = sleeper.sleep(wait) => {}
                    }
                }

                if cancel.is_cancelled() {
                    return;
                }

                match refresh().await {
                    Ok(next_expiry) => {
                        tracing::debug!("credential refreshed");
                        expires_at = next_expiry;
                    }
                    Err(SessionError::Cancelled) => {
                        tracing::debug!("credential refresh cancelled");
                        return;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "credential refresh failed; refresher exiting");
                        return;
                    }
                }
            }
        }
    });

    CredentialRefresherHandle { cancel, join }
}
