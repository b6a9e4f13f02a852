//! Delivers connection-state transitions to the application, and the single
//! error→status classification function used by both the open path and the
//! disconnect watcher.

use std::sync::Arc;

use crate::error::SessionError;
use crate::session::state::{ConnectionStatus, ConnectionStatusInfo, StatusReason};

/// A user-supplied callback invoked on every lifecycle edge. Must be
/// cheap and non-reentrant: it may be invoked while the handler holds
/// `open_lock` or a subscription lock, so it must not call back into the
/// `SessionHandler` it was registered on.
pub type StatusCallback = Arc<dyn Fn(ConnectionStatusInfo) + Send + Sync>;

/// Classifies a failed operation's error into the `(status, reason)` pair
/// reported to the application.
/// `retries_remain` should be `true` only when the failure occurred mid-retry
/// and the policy has already agreed to another attempt; both the open path
/// and the disconnect watcher call this once retries are known to be
/// exhausted (`retries_remain = false`) for the final classification.
pub fn classify_error(error: &SessionError, retries_remain: bool) -> (ConnectionStatus, StatusReason) {
    if error.is_transient() {
        if retries_remain {
            (ConnectionStatus::DisconnectedRetrying, StatusReason::CommunicationError)
        } else {
            (ConnectionStatus::Disconnected, StatusReason::RetryExpired)
        }
    } else if error.is_auth() {
        (ConnectionStatus::Disconnected, StatusReason::BadCredential)
    } else if error.is_identity() {
        (ConnectionStatus::Disconnected, StatusReason::DeviceDisabled)
    } else {
        (ConnectionStatus::Disconnected, StatusReason::CommunicationError)
    }
}
