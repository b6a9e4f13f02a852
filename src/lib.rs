#![forbid(unsafe_code)]

//! # devicebridge
//!
//! A resilient session handler for intermittently connected device clients:
//! open/close lifecycle, exponential-backoff retry with jitter, automatic
//! reconnect with subscription restore, credential refresh, and paginated
//! query cursors.
//!
//! ## Features
//!
//! - **Retry policies** with exponential backoff, jitter, and hot-swappable
//!   policy updates via [`RetryEngine::set_policy`].
//! - **Session lifecycle** state machine (`Closed → Open →
//!   DisconnectedRetrying → ...`) with a background disconnect watcher that
//!   reconnects and restores subscriptions automatically.
//! - **Credential refresh** that runs ahead of expiry for the life of an
//!   open session.
//! - **Query cursors** that paginate continuation-token based results,
//!   retrying each page fetch independently.
//! - **Lock-free state reads** using atomics; writes serialized by
//!   per-concern locks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use devicebridge::{Message, RetryPolicy, SessionHandler, Sleeper, TokioSleeper, Transport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(transport: Arc<dyn Transport>) -> Result<(), devicebridge::SessionError> {
//! let handler = SessionHandler::builder(transport)
//!     .retry_policy(RetryPolicy::ExponentialBackoff {
//!         max_attempts: 5,
//!         min: Duration::from_millis(100),
//!         max: Duration::from_secs(30),
//!         delta: Duration::from_millis(100),
//!     })
//!     .sleeper(Arc::new(TokioSleeper) as Arc<dyn Sleeper>)
//!     .build();
//!
//! let cancel = CancellationToken::new();
//! handler.open(cancel.clone()).await?;
//! handler.send_telemetry(Message { payload: b"hello".to_vec(), ..Default::default() }, cancel.clone()).await?;
//! handler.close(cancel).await?;
//! # Ok(())
//! # }
//! ```

mod cancel;
mod clock;
mod credential;
mod error;
mod query;
mod retry;
mod session;
mod sleeper;
mod status;
mod transport;

pub use cancel::LinkedCancel;
pub use clock::{Clock, MonotonicClock};
pub use credential::{spawn as spawn_credential_refresher, CredentialRefresherHandle};
pub use error::SessionError;
pub use query::{Page, PageFetcher, QueryCursor, QuerySource, CONTINUATION_HEADER, MAX_ITEM_COUNT_HEADER};
pub use retry::{RetryEngine, RetryPolicy};
pub use session::{
    ConnectionStatus, ConnectionStatusInfo, SessionHandler, SessionHandlerBuilder, SessionState,
    StatusReason, SubscriptionFlags,
};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use status::{classify_error, StatusCallback};
pub use transport::{set_subscription, Message, MethodResponse, SubscriptionKind, Transport, TwinProperties};

pub mod prelude;
