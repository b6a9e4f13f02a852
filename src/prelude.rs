//! Convenient re-exports for common devicebridge types.
pub use crate::{
    classify_error, set_subscription, spawn_credential_refresher, ConnectionStatus,
    ConnectionStatusInfo, CredentialRefresherHandle, InstantSleeper, LinkedCancel, Message,
    MethodResponse, Page, PageFetcher, QueryCursor, QuerySource, RetryEngine, RetryPolicy,
    SessionError, SessionHandler, SessionHandlerBuilder, SessionState, Sleeper, StatusCallback,
    StatusReason, SubscriptionFlags, SubscriptionKind, TokioSleeper, Transport, TrackingSleeper,
    TwinProperties,
};
