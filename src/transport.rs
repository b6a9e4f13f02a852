//! Transport Port: the abstract capability a session handler drives. No retry
//! or lifecycle logic lives here — an implementation either succeeds or fails
//! with a classified [`SessionError`]; everything else is the handler's job.

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::SessionError;

/// An outgoing telemetry message: opaque payload plus application properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub payload: Vec<u8>,
    pub properties: HashMap<String, String>,
}

/// A response to an incoming direct-method invocation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MethodResponse {
    pub request_id: String,
    pub status: i32,
    pub payload: Vec<u8>,
}

/// Device twin document: desired/reported property bags, treated as opaque,
/// byte-identical round-trippable content (see spec GLOSSARY).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TwinProperties {
    pub desired: serde_json::Value,
    pub reported: serde_json::Value,
}

/// The subscription kinds a transport supports. Used both by
/// [`crate::session::SubscriptionFlags`] bookkeeping and by the disconnect
/// watcher's recovery fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Methods,
    Twin,
    C2dMessages,
    Events,
}

/// Abstract operations exposed by an underlying transport session
/// (MQTT/AMQP-style). Implementations are injected into a
/// [`crate::session::SessionHandler`]; this crate never constructs one of its
/// own, since the wire transport itself is out of scope for this crate.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<(), SessionError>;
    async fn close(&self) -> Result<(), SessionError>;

    async fn send_telemetry(&self, message: &Message) -> Result<(), SessionError>;
    async fn send_telemetry_batch(&self, messages: &[Message]) -> Result<(), SessionError>;
    async fn send_method_response(&self, response: &MethodResponse) -> Result<(), SessionError>;

    async fn enable_methods(&self) -> Result<(), SessionError>;
    async fn disable_methods(&self) -> Result<(), SessionError>;
    async fn enable_twin(&self) -> Result<(), SessionError>;
    async fn disable_twin(&self) -> Result<(), SessionError>;
    async fn enable_c2d(&self) -> Result<(), SessionError>;
    async fn disable_c2d(&self) -> Result<(), SessionError>;
    async fn enable_events(&self) -> Result<(), SessionError>;
    async fn disable_events(&self) -> Result<(), SessionError>;

    async fn get_twin(&self) -> Result<TwinProperties, SessionError>;
    async fn update_reported_properties(&self, props: &TwinProperties) -> Result<u64, SessionError>;

    async fn refresh_sas(&self) -> Result<SystemTime, SessionError>;

    /// Resolves `Ok(())` on an *unexpected* disconnect (triggering recovery)
    /// or `Err(SessionError::Cancelled)` on a graceful, caller-initiated
    /// close. Any other error is treated as an unexpected disconnect too.
    async fn wait_for_transport_closed(&self) -> Result<(), SessionError>;
}

/// Calls the corresponding `enable_*`/`disable_*` method for a subscription
/// kind. Used by the session handler's toggle protocol and by the disconnect
/// watcher's recovery fan-out so both share one dispatch point.
pub async fn set_subscription(
    transport: &dyn Transport,
    kind: SubscriptionKind,
    enabled: bool,
) -> Result<(), SessionError> {
    match (kind, enabled) {
        (SubscriptionKind::Methods, true) => transport.enable_methods().await,
        (SubscriptionKind::Methods, false) => transport.disable_methods().await,
        (SubscriptionKind::Twin, true) => transport.enable_twin().await,
        (SubscriptionKind::Twin, false) => transport.disable_twin().await,
        (SubscriptionKind::C2dMessages, true) => transport.enable_c2d().await,
        (SubscriptionKind::C2dMessages, false) => transport.disable_c2d().await,
        (SubscriptionKind::Events, true) => transport.enable_events().await,
        (SubscriptionKind::Events, false) => transport.disable_events().await,
    }
}
