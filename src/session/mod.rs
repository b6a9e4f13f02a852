//! Session handler: lifecycle state machine, subscription bookkeeping,
//! operation gating, and disconnect recovery.

pub(crate) mod handler;
pub mod state;
mod watcher;

pub use handler::{SessionHandler, SessionHandlerBuilder};
pub use state::{ConnectionStatus, ConnectionStatusInfo, SessionState, StatusReason, SubscriptionFlags};
