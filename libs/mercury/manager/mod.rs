//! # Mercury Manager
//!
//! The connection manager: connect/disconnect state machine, failure and
//! close classification, and inbound-event dispatch.

pub mod classify;
pub mod dispatch;
pub mod events;
pub mod manager;

pub use classify::{classify_close, CloseDisposition, PermanentKind};
pub use events::{topics, EventBus, Signal};
pub use manager::Mercury;
