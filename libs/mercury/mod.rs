//! # Mercury
//!
//! Connection manager for a real-time event channel: one persistent
//! WebSocket with negotiated URLs, exponential-backoff reconnection,
//! close-code classification, credential/device recovery side effects,
//! and ordered fan-out of inbound envelopes to registered handlers.
//!
//! ## Guarantees
//!
//! - At most one live connection; concurrent `connect()` calls share one
//!   in-flight attempt sequence
//! - `disconnect()` wins over an in-flight `connect()` and stops all
//!   inbound dispatch before resolving
//! - Envelopes dispatch in delivery order; a failing handler never blocks
//!   the rest
//!
//! ## Example
//!
//! ```rust,ignore
//! use mercury::{Mercury, MercuryConfig, topics};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mercury::Result<()> {
//!     let mercury = Mercury::new(
//!         MercuryConfig::default(),
//!         Arc::new(device),
//!         Arc::new(credentials),
//!         Arc::new(features),
//!         Arc::new(services),
//!     );
//!
//!     mercury.handlers().register("activity", |envelope| {
//!         println!("activity: {}", envelope.data);
//!         Ok(())
//!     });
//!     let online = mercury.subscribe(topics::ONLINE);
//!
//!     mercury.connect(None).await?;
//!     online.recv().expect("online signal");
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod manager;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use core::{
    backoff, config, heartbeat, pong_tracker, socket, state, url,
    backoff::{AttemptError, BackoffPolicy, RetryHandle},
    config::MercuryConfig,
    socket::{CloseEvent, Socket, SocketEvent, SocketOptions},
    state::{ConnectionPhase, SessionState, StateSnapshot},
};

// Re-export the manager surface
pub use manager::{classify_close, topics, CloseDisposition, EventBus, Mercury, PermanentKind, Signal};
