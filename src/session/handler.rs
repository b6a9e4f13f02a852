//! Session handler — the heart of the crate. Gates every operation on
//! lifecycle state, drives it through the retry engine, and owns the
//! open/close/dispose protocols.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cancel::LinkedCancel;
use crate::clock::{Clock, MonotonicClock};
use crate::credential::{self, CredentialRefresherHandle};
use crate::error::SessionError;
use crate::retry::{RetryEngine, RetryPolicy};
use crate::session::state::{
    ConnectionStatus, ConnectionStatusInfo, SessionState, StateCell, StatusReason, SubscriptionFlags,
};
use crate::session::watcher;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::status::StatusCallback;
use crate::transport::{set_subscription, Message, MethodResponse, SubscriptionKind, Transport, TwinProperties};

/// Shared state behind every clone of a [`SessionHandler`] and its
/// background tasks. `pub(crate)` because the disconnect watcher (a sibling
/// module) needs direct access; nothing outside `session::` sees this type.
pub(crate) struct Inner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) retry_engine: RetryEngine,
    pub(crate) sleeper: Arc<dyn Sleeper>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) state: StateCell,
    pub(crate) flags: SubscriptionFlags,
    pub(crate) open_lock: AsyncMutex<()>,
    methods_lock: AsyncMutex<()>,
    twin_lock: AsyncMutex<()>,
    c2d_lock: AsyncMutex<()>,
    events_lock: AsyncMutex<()>,
    disposed: AtomicBool,
    ever_closed: AtomicBool,
    pub(crate) cancel_pending: CancellationToken,
    status_cb: Option<StatusCallback>,
    credential_initial_expiry: Option<SystemTime>,
    refresher_started: AtomicBool,
    watcher_handle: AsyncMutex<Option<JoinHandle<()>>>,
    credential_refresher: AsyncMutex<Option<CredentialRefresherHandle>>,
}

impl Inner {
    fn check_not_disposed(&self) -> Result<(), SessionError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(SessionError::ObjectDisposed)
        } else {
            Ok(())
        }
    }

    /// Fails fast if disposed or not open. Called once before entering the
    /// retry engine and again on every attempt, since state may change
    /// between attempts.
    pub(crate) fn check_open(&self) -> Result<(), SessionError> {
        self.check_not_disposed()?;
        if self.state.load() == SessionState::Open {
            Ok(())
        } else {
            let message = if self.ever_closed.load(Ordering::Acquire) {
                "session was closed; construct a new handler to reconnect"
            } else {
                "call open and try again"
            };
            Err(SessionError::NotOpen(message))
        }
    }

    fn lock_for(&self, kind: SubscriptionKind) -> &AsyncMutex<()> {
        match kind {
            SubscriptionKind::Methods => &self.methods_lock,
            SubscriptionKind::Twin => &self.twin_lock,
            SubscriptionKind::C2dMessages => &self.c2d_lock,
            SubscriptionKind::Events => &self.events_lock,
        }
    }

    /// Invoked from open, close, dispose, the disconnect watcher, and the
    /// error classifier. The callback is invoked synchronously but is
    /// documented as never re-entering the handler, so this is safe to call
    /// while holding `open_lock` or a subscription lock.
    pub(crate) fn emit_status(&self, status: ConnectionStatus, reason: StatusReason) {
        let info = ConnectionStatusInfo::now(status, reason);
        tracing::info!(?status, ?reason, "connection status changed");
        if let Some(cb) = &self.status_cb {
            cb(info);
        }
    }
}

/// The resilient device-client session handler. Cheap to clone — every clone
/// shares the same underlying state via an `Arc`.
#[derive(Clone)]
pub struct SessionHandler {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler").field("state", &self.inner.state.load()).finish()
    }
}

impl SessionHandler {
    pub fn builder(transport: Arc<dyn Transport>) -> SessionHandlerBuilder {
        SessionHandlerBuilder::new(transport)
    }

    /// Current lifecycle state, read without blocking.
    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    /// Replaces the retry policy in effect for subsequent operations.
    /// Hot-swappable: operations already in flight keep using the policy
    /// they loaded at the start of their call.
    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        self.inner.retry_engine.set_policy(policy);
    }

    /// Idempotent: `open → open` leaves the state `Open` with exactly one
    /// `Connected` event.
    pub async fn open(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.inner.check_not_disposed()?;
        if self.inner.state.load() == SessionState::Open {
            return Ok(());
        }
        if self.inner.cancel_pending.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let linked = LinkedCancel::new(cancel, self.inner.cancel_pending.clone());
        let _open_guard = self.inner.open_lock.lock().await;

        self.inner.check_not_disposed()?;
        if self.inner.state.load() == SessionState::Open {
            return Ok(());
        }
        if self.inner.cancel_pending.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let inner = self.inner.clone();
        let result = self
            .inner
            .retry_engine
            .run_with_retry(
                move || {
                    let inner = inner.clone();
                    async move { inner.transport.open().await }
                },
                &linked,
            )
            .await;

        match result {
            Ok(()) => {
                self.inner.state.store(SessionState::Open);
                self.inner.emit_status(ConnectionStatus::Connected, StatusReason::ConnectionOk);
                drop(_open_guard);
                self.spawn_watcher();
                self.maybe_spawn_credential_refresher();
                Ok(())
            }
            Err(err) => {
                self.inner.state.store(SessionState::Closed);
                let (status, reason) = crate::status::classify_error(&err, false);
                self.inner.emit_status(status, reason);
                Err(err)
            }
        }
    }

    fn spawn_watcher(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(watcher::run(inner));
        if let Ok(mut slot) = self.inner.watcher_handle.try_lock() {
            *slot = Some(handle);
        } else {
            // A previous watcher handle is being awaited by a concurrent
            // close(); the new watcher still runs, just untracked for join.
        }
    }

    fn maybe_spawn_credential_refresher(&self) {
        let Some(initial_expiry) = self.inner.credential_initial_expiry else {
            return;
        };
        if self.inner.refresher_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let handler = self.clone();
        let handle = credential::spawn(
            initial_expiry,
            self.inner.clock.clone(),
            self.inner.sleeper.clone(),
            move || {
                let handler = handler.clone();
                async move { handler.refresh_sas(CancellationToken::new()).await }
            },
            &self.inner.cancel_pending,
        );
        if let Ok(mut slot) = self.inner.credential_refresher.try_lock() {
            *slot = Some(handle);
        }
    }

    /// Cancels every in-flight operation, closes the transport, and stops
    /// the credential refresher. Idempotent.
    pub async fn close(&self, _cancel: CancellationToken) -> Result<(), SessionError> {
        self.inner.ever_closed.store(true, Ordering::Release);
        if self.inner.state.load() == SessionState::Closed {
            return Ok(());
        }

        self.inner.cancel_pending.cancel();

        let _open_guard = self.inner.open_lock.lock().await;
        if let Err(err) = self.inner.transport.close().await {
            tracing::warn!(error = %err, "transport close reported an error; continuing teardown");
        }

        self.inner.state.store(SessionState::Closed);
        self.inner.emit_status(ConnectionStatus::Closed, StatusReason::ClientClosed);
        drop(_open_guard);

        if let Some(handle) = self.inner.watcher_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(refresher) = self.inner.credential_refresher.lock().await.take() {
            refresher.stop().await;
        }

        Ok(())
    }

    /// Idempotent: sets the disposed flag, then closes (cancel → drain →
    /// drop) so that teardown never unconditionally releases a primitive it
    /// may not own. Double `dispose` is a no-op.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.close(CancellationToken::new()).await;
    }

    async fn run_gated<T, Fut, Op>(&self, cancel: CancellationToken, mut op: Op) -> Result<T, SessionError>
    where
        Fut: std::future::Future<Output = Result<T, SessionError>>,
        Op: FnMut(Arc<Inner>) -> Fut,
    {
        self.inner.check_not_disposed()?;
        let linked = LinkedCancel::new(cancel, self.inner.cancel_pending.clone());
        let inner = self.inner.clone();
        self.inner
            .retry_engine
            .run_with_retry(
                move || {
                    let inner = inner.clone();
                    let attempt = op(inner.clone());
                    async move {
                        inner.check_open()?;
                        attempt.await
                    }
                },
                &linked,
            )
            .await
    }

    pub async fn send_telemetry(&self, message: Message, cancel: CancellationToken) -> Result<(), SessionError> {
        let message = Arc::new(message);
        self.run_gated(cancel, move |inner| {
            let message = message.clone();
            async move { inner.transport.send_telemetry(&message).await }
        })
        .await
    }

    pub async fn send_telemetry_batch(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let messages = Arc::new(messages);
        self.run_gated(cancel, move |inner| {
            let messages = messages.clone();
            async move { inner.transport.send_telemetry_batch(&messages).await }
        })
        .await
    }

    pub async fn send_method_response(
        &self,
        response: MethodResponse,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let response = Arc::new(response);
        self.run_gated(cancel, move |inner| {
            let response = response.clone();
            async move { inner.transport.send_method_response(&response).await }
        })
        .await
    }

    pub async fn get_twin(&self, cancel: CancellationToken) -> Result<TwinProperties, SessionError> {
        self.run_gated(cancel, |inner| async move { inner.transport.get_twin().await }).await
    }

    pub async fn update_reported_properties(
        &self,
        props: TwinProperties,
        cancel: CancellationToken,
    ) -> Result<u64, SessionError> {
        let props = Arc::new(props);
        self.run_gated(cancel, move |inner| {
            let props = props.clone();
            async move { inner.transport.update_reported_properties(&props).await }
        })
        .await
    }

    pub async fn refresh_sas(&self, cancel: CancellationToken) -> Result<SystemTime, SessionError> {
        self.run_gated(cancel, |inner| async move { inner.transport.refresh_sas().await }).await
    }

    async fn toggle(
        &self,
        kind: SubscriptionKind,
        enabled: bool,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        self.inner.check_not_disposed()?;
        let linked = LinkedCancel::new(cancel, self.inner.cancel_pending.clone());
        let inner = self.inner.clone();
        self.inner
            .retry_engine
            .run_with_retry(
                move || {
                    let inner = inner.clone();
                    async move {
                        inner.check_open()?;
                        let lock = inner.lock_for(kind);
                        let _guard = lock.lock().await;
                        inner.check_open()?;
                        set_subscription(inner.transport.as_ref(), kind, enabled).await?;
                        inner.flags.set(kind, enabled);
                        Ok(())
                    }
                },
                &linked,
            )
            .await
    }

    pub async fn enable_methods(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::Methods, true, cancel).await
    }
    pub async fn disable_methods(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::Methods, false, cancel).await
    }
    pub async fn enable_twin(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::Twin, true, cancel).await
    }
    pub async fn disable_twin(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::Twin, false, cancel).await
    }
    pub async fn enable_c2d(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::C2dMessages, true, cancel).await
    }
    pub async fn disable_c2d(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::C2dMessages, false, cancel).await
    }
    pub async fn enable_events(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::Events, true, cancel).await
    }
    pub async fn disable_events(&self, cancel: CancellationToken) -> Result<(), SessionError> {
        self.toggle(SubscriptionKind::Events, false, cancel).await
    }
}

/// Builds a [`SessionHandler`] from a transport, a retry policy, and a
/// status callback.
pub struct SessionHandlerBuilder {
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    status_cb: Option<StatusCallback>,
    credential_initial_expiry: Option<SystemTime>,
}

impl SessionHandlerBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry_policy: RetryPolicy::ExponentialBackoff {
                max_attempts: 5,
                min: std::time::Duration::from_millis(100),
                max: std::time::Duration::from_secs(30),
                delta: std::time::Duration::from_millis(100),
            },
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(MonotonicClock::default()),
            status_cb: None,
            credential_initial_expiry: None,
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn on_status_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionStatusInfo) + Send + Sync + 'static,
    {
        self.status_cb = Some(Arc::new(callback));
        self
    }

    /// Enables the credential refresher, activated once the session has
    /// completed its first successful `open` (see DESIGN.md for why it is
    /// not eagerly active before there is anything to refresh against).
    pub fn credential_expiry(mut self, expires_at: SystemTime) -> Self {
        self.credential_initial_expiry = Some(expires_at);
        self
    }

    pub fn build(self) -> SessionHandler {
        SessionHandler {
            inner: Arc::new(Inner {
                transport: self.transport,
                retry_engine: RetryEngine::new(self.retry_policy, self.sleeper.clone()),
                sleeper: self.sleeper,
                clock: self.clock,
                state: StateCell::new(SessionState::Closed),
                flags: SubscriptionFlags::default(),
                open_lock: AsyncMutex::new(()),
                methods_lock: AsyncMutex::new(()),
                twin_lock: AsyncMutex::new(()),
                c2d_lock: AsyncMutex::new(()),
                events_lock: AsyncMutex::new(()),
                disposed: AtomicBool::new(false),
                ever_closed: AtomicBool::new(false),
                cancel_pending: CancellationToken::new(),
                status_cb: self.status_cb,
                credential_initial_expiry: self.credential_initial_expiry,
                refresher_started: AtomicBool::new(false),
                watcher_handle: AsyncMutex::new(None),
                credential_refresher: AsyncMutex::new(None),
            }),
        }
    }
}
