//! Inbound envelope dispatch
//!
//! For each envelope, in order: apply header overrides onto the payload,
//! run the registered handlers for the event's leaf name, then emit the
//! generic `event` signal, the namespaced `event:<namespace>` signal, and
//! `event:<full.event.name>` when it differs from the namespace.
//!
//! Dispatch errors never reach the socket layer: handler failures are
//! logged by the registry, and an envelope without an event type is
//! dropped with a warning.

use crate::manager::events::{topics, EventBus, Signal};
use crate::traits::{Envelope, HandlerRegistry};
use tracing::{debug, warn};

pub fn dispatch_envelope(handlers: &HandlerRegistry, bus: &EventBus, mut envelope: Envelope) {
    envelope.apply_header_overrides();

    let Some(event_type) = envelope.event_type().map(str::to_string) else {
        warn!("Dropping envelope without an event type");
        return;
    };
    let namespace = envelope
        .namespace()
        .unwrap_or(event_type.as_str())
        .to_string();
    let leaf = envelope
        .event_leaf()
        .unwrap_or(event_type.as_str())
        .to_string();

    let invoked = handlers.dispatch(&leaf, &envelope);
    debug!("Dispatched '{}' to {} handler(s)", event_type, invoked);

    bus.emit(topics::EVENT, Signal::Event(envelope.clone()));
    bus.emit(
        &topics::event_scoped(&namespace),
        Signal::Event(envelope.clone()),
    );
    if event_type != namespace {
        bus.emit(&topics::event_scoped(&event_type), Signal::Event(envelope));
    }
}
