//! Error taxonomy shared by the retry engine, session handler, and query cursor.
//!
//! A closed sum type rather than a generic `ResilienceError<E>` wrapper: every
//! fallible operation in this crate already knows its own failure kinds, so
//! there is no caller-supplied inner error to carry.

use std::time::Duration;

/// Unified error type for the session handler, retry engine, and query cursor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Transient network failure (dropped socket, DNS hiccup, connection reset).
    #[error("network error: {message}")]
    Network {
        /// Human-readable detail from the transport.
        message: String,
    },

    /// The server asked the caller to back off (e.g. MQTT/AMQP throttling).
    #[error("operation throttled by server")]
    Throttled,

    /// The server reported itself as busy (5xx-equivalent).
    #[error("server busy")]
    ServerBusy,

    /// The operation did not complete within its allotted time.
    #[error("operation timed out after {elapsed:?}")]
    Timeout {
        /// How long the operation ran before timing out.
        elapsed: Duration,
    },

    /// Credential rejected by the server (401-equivalent).
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server-supplied detail, if any.
        message: String,
    },

    /// The device is unknown to the service or has been disabled.
    #[error("device not found or disabled")]
    DeviceNotFound,

    /// Caller supplied an invalid argument; never retried.
    #[error("invalid argument: {message}")]
    ArgumentInvalid {
        /// What was wrong with the argument.
        message: String,
    },

    /// The handler has been disposed; no further operations are possible.
    #[error("object has already been disposed")]
    ObjectDisposed,

    /// The session is not currently open. The message distinguishes "never
    /// opened" from "closed" for callers that log it directly.
    #[error("session is not open ({0})")]
    NotOpen(&'static str),

    /// The operation was cancelled, either by the caller's token or by a
    /// concurrent session close.
    #[error("operation was cancelled")]
    Cancelled,

    /// An unclassified, non-retryable failure. Propagated verbatim, never
    /// retried regardless of policy.
    #[error("fatal error: {message}")]
    Fatal {
        /// Detail carried from the underlying failure.
        message: String,
    },
}

impl SessionError {
    /// Transient failures (`Network`, `Throttled`, `ServerBusy`, `Timeout`) are
    /// the only kinds a [`RetryPolicy`](crate::retry::RetryPolicy) should retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Throttled | Self::ServerBusy | Self::Timeout { .. })
    }

    /// `true` for `Unauthorized` — maps to
    /// [`StatusReason::BadCredential`](crate::status::StatusReason::BadCredential).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// `true` for `DeviceNotFound` — maps to
    /// [`StatusReason::DeviceDisabled`](crate::status::StatusReason::DeviceDisabled).
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::DeviceNotFound)
    }

    /// `true` for `Fatal`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// `true` for `Cancelled`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// `true` for `ObjectDisposed` or `NotOpen` — the lifecycle-gate failures.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::ObjectDisposed | Self::NotOpen(_))
    }

    /// Maps an HTTP-equivalent status code from a query/job-fetch response onto
    /// the taxonomy: 408/429/5xx are transient, 401 is `Unauthorized`, and
    /// everything else (403/404 included) is `Fatal` — a malformed or
    /// unauthorized query, not a missing device.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 => Self::Timeout { elapsed: Duration::from_secs(0) },
            429 => Self::Throttled,
            500..=599 => Self::ServerBusy,
            401 => Self::Unauthorized { message },
            _ => Self::Fatal { message },
        }
    }
}
