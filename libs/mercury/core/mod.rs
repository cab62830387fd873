//! # Mercury Core
//!
//! Leaf components of the event channel:
//!
//! - **Socket**: one physical connection with heartbeat liveness and
//!   sequence tracking
//! - **Backoff**: the exponential-backoff retry driver
//! - **SessionState**: the atomic connection phase and its snapshots
//! - **URL construction**: flag-driven query composition
//! - **Config**: recognized options and their defaults

pub mod backoff;
pub mod config;
pub mod heartbeat;
pub mod pong_tracker;
pub mod socket;
pub mod state;
pub mod url;

// Re-export main types
pub use backoff::{AttemptError, BackoffPolicy, RetryHandle};
pub use config::MercuryConfig;
pub use pong_tracker::PongTracker;
pub use socket::{CloseEvent, Socket, SocketEvent, SocketOptions};
pub use state::{ConnectionPhase, SessionState, StateSnapshot};
pub use url::{build_connection_url, ConnectionUrlContext};

// Re-export traits for convenience
pub use crate::traits::*;
