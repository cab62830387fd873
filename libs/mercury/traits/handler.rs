//! Event Handler Registration
//!
//! Inbound envelopes are dispatched to handlers through an explicit
//! registration table keyed by the event's leaf name (event
//! `conversation.activity` → key `activity`). Collaborators populate the
//! table at startup; there is no reflective lookup at dispatch time.
//!
//! # Ordering Guarantees
//!
//! - Handlers for one envelope run sequentially in registration order
//! - A handler error is logged and never blocks the remaining handlers
//! - Dispatch for envelope N completes before envelope N+1 begins

use crate::envelope::Envelope;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

/// Handler invoked for envelopes matching its registered event leaf
///
/// Handlers run on the manager's dispatch task. Errors are logged at the
/// dispatch site and never propagate to the socket layer or to other
/// handlers.
pub trait EventHandler: Send {
    fn handle(&mut self, envelope: &Envelope) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: FnMut(&Envelope) -> Result<()> + Send,
{
    fn handle(&mut self, envelope: &Envelope) -> Result<()> {
        self(envelope)
    }
}

/// Registration table from event leaf name to handler list
///
/// Handlers need `&mut` access and run one at a time, so the table lives
/// behind a mutex rather than a reader/writer lock.
pub struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Vec<Box<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handler for an event leaf name
    ///
    /// Multiple handlers may share a key; they run in registration order.
    pub fn register(&self, event_leaf: impl Into<String>, handler: impl EventHandler + 'static) {
        let mut handlers = self.handlers.lock();
        handlers
            .entry(event_leaf.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Number of handlers registered for a key
    pub fn handler_count(&self, event_leaf: &str) -> usize {
        self.handlers.lock().get(event_leaf).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the envelope's event leaf
    ///
    /// Returns the number of handlers that ran. Handler errors are logged
    /// and swallowed so one failing handler cannot starve the rest.
    pub fn dispatch(&self, event_leaf: &str, envelope: &Envelope) -> usize {
        let mut handlers = self.handlers.lock();
        let Some(registered) = handlers.get_mut(event_leaf) else {
            return 0;
        };

        let mut invoked = 0;
        for handler in registered.iter_mut() {
            invoked += 1;
            if let Err(e) = handler.handle(envelope) {
                warn!("Handler error for event '{}': {}", event_leaf, e);
            }
        }
        invoked
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
