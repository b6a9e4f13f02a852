//! Session lifecycle state, subscription bookkeeping, and connection status
//! records.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::SystemTime;

use crate::transport::SubscriptionKind;

/// Lifecycle state of the logical session. `SessionState` is read via an
/// atomic snapshot and written only under `open_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, and the state reached again after `dispose`. Also the
    /// state held for the duration of an in-flight `open` attempt: the spec's
    /// data model names no separate "opening" state, so a failed `open`
    /// leaves observers unable to distinguish "never opened" from "currently
    /// attempting" by state alone — which matches spec.md §4.D step 5
    /// ("leave state as-was").
    Closed,
    Open,
    /// Transient: set while the disconnect watcher attempts recovery.
    DisconnectedRetrying,
    /// Terminal: recovery's retries were exhausted.
    Disconnected,
    /// Terminal: the user called `close`.
    Disabled,
}

impl SessionState {
    const CLOSED: u8 = 0;
    const OPEN: u8 = 1;
    const DISCONNECTED_RETRYING: u8 = 2;
    const DISCONNECTED: u8 = 3;
    const DISABLED: u8 = 4;

    fn to_u8(self) -> u8 {
        match self {
            Self::Closed => Self::CLOSED,
            Self::Open => Self::OPEN,
            Self::DisconnectedRetrying => Self::DISCONNECTED_RETRYING,
            Self::Disconnected => Self::DISCONNECTED,
            Self::Disabled => Self::DISABLED,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            Self::CLOSED => Self::Closed,
            Self::OPEN => Self::Open,
            Self::DISCONNECTED_RETRYING => Self::DisconnectedRetrying,
            Self::DISCONNECTED => Self::Disconnected,
            Self::DISABLED => Self::Disabled,
            other => unreachable!("invalid SessionState tag {other}"),
        }
    }
}

/// Lock-free holder for the current [`SessionState`]. Reads never block;
/// writes are serialized by the caller holding `open_lock`.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: SessionState) -> Self {
        Self(AtomicU8::new(initial.to_u8()))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Must only be called while `open_lock` is held.
    pub fn store(&self, state: SessionState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// Independent booleans recording which subscriptions the user has asked for.
/// Bookkeeping only: the user asked for it and we should re-enable it on
/// reconnect. Each flag is written only under its kind's lock and read under
/// the same lock or immediately after a state-consistent open.
#[derive(Debug, Default)]
pub struct SubscriptionFlags {
    methods: AtomicBool,
    twin: AtomicBool,
    c2d_messages: AtomicBool,
    events: AtomicBool,
}

impl SubscriptionFlags {
    pub fn set(&self, kind: SubscriptionKind, value: bool) {
        self.flag(kind).store(value, Ordering::Release);
    }

    pub fn get(&self, kind: SubscriptionKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }

    fn flag(&self, kind: SubscriptionKind) -> &AtomicBool {
        match kind {
            SubscriptionKind::Methods => &self.methods,
            SubscriptionKind::Twin => &self.twin,
            SubscriptionKind::C2dMessages => &self.c2d_messages,
            SubscriptionKind::Events => &self.events,
        }
    }

    /// Snapshot of every kind currently flagged on, for the disconnect
    /// watcher's recovery fan-out.
    pub fn enabled_kinds(&self) -> Vec<SubscriptionKind> {
        [
            SubscriptionKind::Methods,
            SubscriptionKind::Twin,
            SubscriptionKind::C2dMessages,
            SubscriptionKind::Events,
        ]
        .into_iter()
        .filter(|kind| self.get(*kind))
        .collect()
    }
}

/// Connection status observed by the application, reported via
/// [`crate::status::StatusCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    DisconnectedRetrying,
    Disconnected,
    Closed,
    Disabled,
}

/// Why a status transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    ConnectionOk,
    CommunicationError,
    RetryExpired,
    ClientClosed,
    BadCredential,
    DeviceDisabled,
}

/// `(status, reason, timestamp)` delivered on every lifecycle edge.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStatusInfo {
    pub status: ConnectionStatus,
    pub reason: StatusReason,
    pub timestamp: SystemTime,
}

impl ConnectionStatusInfo {
    pub fn now(status: ConnectionStatus, reason: StatusReason) -> Self {
        Self { status, reason, timestamp: SystemTime::now() }
    }
}
