//! Retry engine: drives a fallible async operation under a hot-swappable
//! [`RetryPolicy`], respecting a linked cancellation source.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cancel::LinkedCancel;
use crate::error::SessionError;
use crate::retry::policy::RetryPolicy;
use crate::sleeper::Sleeper;

/// Runs operations under a `RetryPolicy` that can be swapped out at any time
/// (e.g. via [`crate::session::SessionHandler::set_retry_policy`]) without
/// disturbing attempts already in flight, since each call loads its own
/// snapshot of the policy at the start of the call.
#[derive(Clone)]
pub struct RetryEngine {
    policy: Arc<ArcSwap<RetryPolicy>>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine").field("policy", &*self.policy.load()).finish()
    }
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy: Arc::new(ArcSwap::from_pointee(policy)), sleeper }
    }

    /// Atomically replaces the policy used by subsequent calls.
    pub fn set_policy(&self, policy: RetryPolicy) {
        self.policy.store(Arc::new(policy));
    }

    /// A snapshot of the currently installed policy.
    pub fn current_policy(&self) -> Arc<RetryPolicy> {
        self.policy.load_full()
    }

    /// Runs `op` until it succeeds, the policy refuses a retry, or `cancel`
    /// fires: check cancel before and after each attempt, consult the policy
    /// on failure, sleep the suggested delay in a way that cancellation can
    /// interrupt, and never accumulate errors — only the most recent one is
    /// ever returned.
    pub async fn run_with_retry<T, Fut, Op>(&self, mut op: Op, cancel: &LinkedCancel) -> Result<T, SessionError>
    where
        Fut: Future<Output = Result<T, SessionError>>,
        Op: FnMut() -> Fut,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if cancel.is_cancelled() {
                        return Err(SessionError::Cancelled);
                    }

                    let policy = self.policy.load();
                    let Some(delay) = policy.should_retry(attempt, &err) else {
                        return Err(err);
                    };

                    tracing::debug!(attempt, ?delay, error = %err, "retrying after transient failure");
                    tokio::select! {
                        () = cancel.cancelled() => return Err(SessionError::Cancelled),
                        () = self.sleeper.sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
