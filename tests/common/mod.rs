//! Shared stub `Transport` used across the end-to-end scenario tests.
//! Not a mock framework: a small hand-rolled fake that records every call
//! and lets results be queued or triggered on demand.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use devicebridge::{Message, MethodResponse, SessionError, Transport, TwinProperties};
use tokio::sync::Notify;

/// One call observed by a [`StubTransport`], in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Open,
    Close,
    SendTelemetry,
    SendTelemetryBatch,
    SendMethodResponse,
    EnableMethods,
    DisableMethods,
    EnableTwin,
    DisableTwin,
    EnableC2d,
    DisableC2d,
    EnableEvents,
    DisableEvents,
    GetTwin,
    UpdateReportedProperties,
    RefreshSas,
}

/// A fake transport whose `open`/`send_telemetry` results can be queued in
/// advance, and whose `wait_for_transport_closed` can be triggered on demand
/// to simulate an unexpected disconnect or a graceful close.
#[derive(Default)]
pub struct StubTransport {
    calls: Mutex<Vec<Call>>,
    open_queue: Mutex<VecDeque<Result<(), SessionError>>>,
    send_telemetry_queue: Mutex<VecDeque<Result<(), SessionError>>>,
    disable_methods_queue: Mutex<VecDeque<Result<(), SessionError>>>,
    closed_outcome: Mutex<Option<Result<(), SessionError>>>,
    closed_notify: Notify,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_open_result(&self, result: Result<(), SessionError>) {
        self.open_queue.lock().expect("open_queue poisoned").push_back(result);
    }

    pub fn queue_send_telemetry_result(&self, result: Result<(), SessionError>) {
        self.send_telemetry_queue.lock().expect("send_telemetry_queue poisoned").push_back(result);
    }

    pub fn queue_disable_methods_result(&self, result: Result<(), SessionError>) {
        self.disable_methods_queue.lock().expect("disable_methods_queue poisoned").push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    pub fn call_count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    /// Simulates the transport dropping unexpectedly: `wait_for_transport_closed`
    /// resolves `Ok(())`, which the disconnect watcher treats as a signal to
    /// begin recovery.
    pub fn trigger_unexpected_close(&self) {
        *self.closed_outcome.lock().expect("closed_outcome poisoned") = Some(Ok(()));
        self.closed_notify.notify_one();
    }

    /// Simulates a graceful, caller-initiated close: `wait_for_transport_closed`
    /// resolves `Cancelled`.
    pub fn trigger_graceful_close(&self) {
        *self.closed_outcome.lock().expect("closed_outcome poisoned") = Some(Err(SessionError::Cancelled));
        self.closed_notify.notify_one();
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls poisoned").push(call);
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn open(&self) -> Result<(), SessionError> {
        self.record(Call::Open);
        self.open_queue.lock().expect("open_queue poisoned").pop_front().unwrap_or(Ok(()))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.record(Call::Close);
        Ok(())
    }

    async fn send_telemetry(&self, _message: &Message) -> Result<(), SessionError> {
        self.record(Call::SendTelemetry);
        self.send_telemetry_queue.lock().expect("send_telemetry_queue poisoned").pop_front().unwrap_or(Ok(()))
    }

    async fn send_telemetry_batch(&self, _messages: &[Message]) -> Result<(), SessionError> {
        self.record(Call::SendTelemetryBatch);
        Ok(())
    }

    async fn send_method_response(&self, _response: &MethodResponse) -> Result<(), SessionError> {
        self.record(Call::SendMethodResponse);
        Ok(())
    }

    async fn enable_methods(&self) -> Result<(), SessionError> {
        self.record(Call::EnableMethods);
        Ok(())
    }

    async fn disable_methods(&self) -> Result<(), SessionError> {
        self.record(Call::DisableMethods);
        self.disable_methods_queue.lock().expect("disable_methods_queue poisoned").pop_front().unwrap_or(Ok(()))
    }

    async fn enable_twin(&self) -> Result<(), SessionError> {
        self.record(Call::EnableTwin);
        Ok(())
    }

    async fn disable_twin(&self) -> Result<(), SessionError> {
        self.record(Call::DisableTwin);
        Ok(())
    }

    async fn enable_c2d(&self) -> Result<(), SessionError> {
        self.record(Call::EnableC2d);
        Ok(())
    }

    async fn disable_c2d(&self) -> Result<(), SessionError> {
        self.record(Call::DisableC2d);
        Ok(())
    }

    async fn enable_events(&self) -> Result<(), SessionError> {
        self.record(Call::EnableEvents);
        Ok(())
    }

    async fn disable_events(&self) -> Result<(), SessionError> {
        self.record(Call::DisableEvents);
        Ok(())
    }

    async fn get_twin(&self) -> Result<TwinProperties, SessionError> {
        self.record(Call::GetTwin);
        Ok(TwinProperties::default())
    }

    async fn update_reported_properties(&self, _props: &TwinProperties) -> Result<u64, SessionError> {
        self.record(Call::UpdateReportedProperties);
        Ok(1)
    }

    async fn refresh_sas(&self) -> Result<SystemTime, SessionError> {
        self.record(Call::RefreshSas);
        Ok(SystemTime::now() + Duration::from_secs(3600))
    }

    async fn wait_for_transport_closed(&self) -> Result<(), SessionError> {
        loop {
            if let Some(outcome) = self.closed_outcome.lock().expect("closed_outcome poisoned").take() {
                return outcome;
            }
            self.closed_notify.notified().await;
        }
    }
}

/// Polls `predicate` until it's true or `timeout` elapses, without assuming a
/// particular scheduling order between the test and the handler's background
/// tasks (the disconnect watcher and credential refresher run on spawned
/// tasks, not synchronously with the calls that trigger them).
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn new_handle() -> Arc<StubTransport> {
    Arc::new(StubTransport::new())
}
