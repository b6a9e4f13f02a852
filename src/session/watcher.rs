//! Disconnect watcher: the background task spawned after every successful
//! open that awaits the transport's unexpected-close signal and drives
//! subscription-preserving recovery.

use std::sync::Arc;

use crate::cancel::LinkedCancel;
use crate::error::SessionError;
use crate::session::handler::Inner;
use crate::session::state::{ConnectionStatus, SessionState, StatusReason};
use crate::status::classify_error;
use crate::transport::set_subscription;

/// Runs until a graceful close is observed or recovery is abandoned. On a
/// successful reconnect it loops back to waiting for the next unexpected
/// close rather than spawning a fresh task — behaviorally identical to
/// spawning a new watcher, since there is still exactly one live watcher
/// for the session at any time.
pub(crate) async fn run(inner: Arc<Inner>) {
    loop {
        match inner.transport.wait_for_transport_closed().await {
            Err(SessionError::Cancelled) => {
                inner.emit_status(ConnectionStatus::Disabled, StatusReason::ClientClosed);
                return;
            }
            Ok(()) | Err(_) => {
                // Any non-cancelled outcome (including an unexpected error
                // from the wait itself) is treated as an unexpected close.
            }
        }

        let _open_guard = inner.open_lock.lock().await;
        if inner.cancel_pending.is_cancelled() {
            inner.emit_status(ConnectionStatus::Disabled, StatusReason::ClientClosed);
            return;
        }

        inner.state.store(SessionState::DisconnectedRetrying);
        inner.emit_status(ConnectionStatus::DisconnectedRetrying, StatusReason::CommunicationError);

        let probe = SessionError::Network { message: "transport closed unexpectedly".into() };
        let policy = inner.retry_engine.current_policy();
        let Some(delay) = policy.should_retry(0, &probe) else {
            inner.state.store(SessionState::Disconnected);
            inner.emit_status(ConnectionStatus::Disconnected, StatusReason::RetryExpired);
            return;
        };
        drop(policy);

        let watcher_cancel = inner.cancel_pending.child_token();
        tokio::select! {
            () = watcher_cancel.cancelled() => {
                inner.emit_status(ConnectionStatus::Disabled, StatusReason::ClientClosed);
                return;
            }
            () = inner.sleeper.sleep(delay) => {}
        }

        let linked = LinkedCancel::new(watcher_cancel.clone(), inner.cancel_pending.clone());
        let recovery = {
            let inner = inner.clone();
            inner
                .retry_engine
                .run_with_retry(
                    move || {
                        let inner = inner.clone();
                        async move {
                            inner.transport.open().await?;
                            let kinds = inner.flags.enabled_kinds();
                            let enables = kinds
                                .into_iter()
                                .map(|kind| {
                                    let transport = inner.transport.clone();
                                    async move { set_subscription(transport.as_ref(), kind, true).await }
                                });
                            futures::future::try_join_all(enables).await?;
                            Ok(())
                        }
                    },
                    &linked,
                )
                .await
        };

        match recovery {
            Ok(()) => {
                inner.state.store(SessionState::Open);
                inner.emit_status(ConnectionStatus::Connected, StatusReason::ConnectionOk);
                drop(_open_guard);
                // Loop back around to await the next unexpected close.
            }
            Err(err) if err.is_cancelled() => {
                // close() cancelled recovery out from under us: this is a
                // graceful shutdown, not a recovery failure, so it must not
                // be routed through classify_error (which would emit a
                // second, bogus terminal status alongside close()'s own).
                inner.emit_status(ConnectionStatus::Disabled, StatusReason::ClientClosed);
                return;
            }
            Err(err) => {
                let retries_remain = policy_would_retry(&inner, &err);
                let (status, reason) = classify_error(&err, retries_remain);
                inner.state.store(if status == ConnectionStatus::Disconnected {
                    SessionState::Disconnected
                } else {
                    SessionState::DisconnectedRetrying
                });
                inner.emit_status(status, reason);
                return;
            }
        }
    }
}

fn policy_would_retry(inner: &Inner, err: &SessionError) -> bool {
    inner.retry_engine.current_policy().should_retry(0, err).is_some()
}
