//! Linked cancellation: every call is cancelled by whichever fires first of the
//! caller's own token and the session's internal `cancel_pending` source.

use tokio_util::sync::CancellationToken;

/// Combines a caller-supplied [`CancellationToken`] with an internal one so
/// that either firing cancels the operation, without merging the two tokens
/// into a shared hierarchy (the caller's token is owned by the caller).
#[derive(Debug, Clone)]
pub struct LinkedCancel {
    user: CancellationToken,
    internal: CancellationToken,
}

impl LinkedCancel {
    pub fn new(user: CancellationToken, internal: CancellationToken) -> Self {
        Self { user, internal }
    }

    /// A linked cancel with no internal source — only the caller's token applies.
    pub fn user_only(user: CancellationToken) -> Self {
        Self { user, internal: CancellationToken::new() }
    }

    pub fn is_cancelled(&self) -> bool {
        self.user.is_cancelled() || self.internal.is_cancelled()
    }

    /// Resolves as soon as either source is cancelled.
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.user.cancelled() => {}
            () = self.internal.cancelled() => {}
        }
    }
}
