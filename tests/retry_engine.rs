//! Retry policy boundary behaviors: `NoRetry` never sleeps, exponential
//! backoff clamps into `[min, max]`, and a disconnect-watcher policy that
//! refuses on attempt 0 aborts recovery without ever calling transport
//! `open` again.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{wait_until, Call};
use devicebridge::{
    ConnectionStatus, ConnectionStatusInfo, RetryEngine, RetryPolicy, SessionError, SessionHandler,
    SessionState, StatusReason, TrackingSleeper,
};
use tokio_util::sync::CancellationToken;

fn linked(cancel: CancellationToken) -> devicebridge::LinkedCancel {
    devicebridge::LinkedCancel::user_only(cancel)
}

/// `NoRetry`: the first transport error propagates immediately and no sleep
/// occurs.
#[tokio::test]
async fn no_retry_propagates_first_error_without_sleeping() {
    let sleeper = Arc::new(TrackingSleeper::new());
    let engine = RetryEngine::new(RetryPolicy::NoRetry, sleeper.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    let result: Result<(), SessionError> = engine
        .run_with_retry(
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SessionError::Network { message: "down".into() })
                }
            },
            &linked(CancellationToken::new()),
        )
        .await;

    assert!(matches!(result, Err(SessionError::Network { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(sleeper.calls(), 0);
}

/// Exponential backoff clamps every attempt's delay into `[min, max]`, no
/// matter how large the attempt index grows.
#[tokio::test]
async fn exponential_backoff_clamps_every_attempt_into_bounds() {
    let min = Duration::from_millis(50);
    let max = Duration::from_millis(500);
    let policy =
        RetryPolicy::ExponentialBackoff { max_attempts: 20, min, max, delta: Duration::from_millis(80) };

    for attempt in 0..16 {
        let delay = policy
            .should_retry(attempt, &SessionError::Network { message: "x".into() })
            .expect("policy should still be retrying at this attempt");
        assert!(delay >= min, "attempt {attempt} delay {delay:?} below min {min:?}");
        assert!(delay <= max, "attempt {attempt} delay {delay:?} above max {max:?}");
    }
}

/// A disconnect-watcher policy that refuses to retry at attempt 0 emits
/// exactly `(DisconnectedRetrying, CommunicationError)` followed by
/// `(Disconnected, RetryExpired)` — no recovery `open` is ever attempted.
#[tokio::test]
async fn watcher_with_immediately_refusing_policy_aborts_without_reopening() {
    let transport = common::new_handle();
    let log: Arc<Mutex<Vec<(ConnectionStatus, StatusReason)>>> = Arc::new(Mutex::new(Vec::new()));
    let collected = log.clone();

    let handler = SessionHandler::builder(transport.clone())
        .retry_policy(RetryPolicy::NoRetry)
        .on_status_change(move |info: ConnectionStatusInfo| {
            collected.lock().unwrap().push((info.status, info.reason));
        })
        .build();

    handler.open(CancellationToken::new()).await.unwrap();
    assert_eq!(transport.call_count(Call::Open), 1);

    transport.trigger_unexpected_close();

    let settled = wait_until(Duration::from_secs(2), || handler.state() == SessionState::Disconnected).await;
    assert!(settled, "watcher should settle into Disconnected once the policy refuses recovery");

    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[
            (ConnectionStatus::Connected, StatusReason::ConnectionOk),
            (ConnectionStatus::DisconnectedRetrying, StatusReason::CommunicationError),
            (ConnectionStatus::Disconnected, StatusReason::RetryExpired),
        ]
    );
    // Recovery never got as far as calling transport `open` a second time.
    assert_eq!(transport.call_count(Call::Open), 1);
}
