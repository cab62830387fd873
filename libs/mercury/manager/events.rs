//! Typed publish/subscribe surface of the connection manager
//!
//! An explicit registry from topic string to subscriber channels. Fan-out
//! follows subscription order; a subscriber whose receiver was dropped is
//! pruned on the next emit and never affects the others.

use crate::core::CloseEvent;
use crate::traits::Envelope;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Well-known topic names
pub mod topics {
    pub const ONLINE: &str = "online";
    pub const OFFLINE: &str = "offline";
    pub const OFFLINE_PERMANENT: &str = "offline.permanent";
    pub const OFFLINE_REPLACED: &str = "offline.replaced";
    pub const OFFLINE_TRANSIENT: &str = "offline.transient";
    pub const EVENT: &str = "event";
    pub const CONNECTION_FAILED: &str = "connection_failed";
    pub const SEQUENCE_MISMATCH: &str = "sequence-mismatch";
    pub const PING_PONG_LATENCY: &str = "ping-pong-latency";

    /// Topic for a scoped event signal (`event:<namespace>` or
    /// `event:<full.event.name>`)
    pub fn event_scoped(name: &str) -> String {
        format!("event:{}", name)
    }
}

/// Payload delivered to subscribers
#[derive(Debug, Clone)]
pub enum Signal {
    Online,
    Offline(CloseEvent),
    /// One failed connection attempt (observability; may be suppressed for
    /// network-shaped failures during an outage)
    ConnectionFailed { attempt: u32, reason: String },
    Event(Envelope),
    SequenceMismatch { expected: u64, actual: u64 },
    PingPongLatency(Duration),
}

/// Topic registry with channel-based fan-out
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Sender<Signal>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a topic; events arrive in emit order
    pub fn subscribe(&self, topic: impl Into<String>) -> Receiver<Signal> {
        let (tx, rx) = unbounded();
        self.subscribers.write().entry(topic.into()).or_default().push(tx);
        rx
    }

    /// Deliver `signal` to every live subscriber of `topic`
    ///
    /// Subscribers receive in subscription order; dropped receivers are
    /// pruned here rather than erroring.
    pub fn emit(&self, topic: &str, signal: Signal) {
        let mut subscribers = self.subscribers.write();
        let Some(list) = subscribers.get_mut(topic) else {
            return;
        };
        list.retain(|tx| tx.send(signal.clone()).is_ok());
        if list.is_empty() {
            subscribers.remove(topic);
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.read().get(topic).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let first = bus.subscribe(topics::ONLINE);
        let second = bus.subscribe(topics::ONLINE);

        bus.emit(topics::ONLINE, Signal::Online);

        assert!(matches!(first.try_recv(), Ok(Signal::Online)));
        assert!(matches!(second.try_recv(), Ok(Signal::Online)));
    }

    #[test]
    fn test_emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.emit(topics::OFFLINE, Signal::Online);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe(topics::EVENT);
        let dropped = bus.subscribe(topics::EVENT);
        drop(dropped);

        bus.emit(
            topics::EVENT,
            Signal::SequenceMismatch {
                expected: 2,
                actual: 5,
            },
        );

        assert_eq!(bus.subscriber_count(topics::EVENT), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn test_topics_are_independent() {
        let bus = EventBus::new();
        let online = bus.subscribe(topics::ONLINE);
        let offline = bus.subscribe(topics::OFFLINE);

        bus.emit(topics::ONLINE, Signal::Online);

        assert!(online.try_recv().is_ok());
        assert!(offline.try_recv().is_err());
    }

    #[test]
    fn test_scoped_event_topic_name() {
        assert_eq!(topics::event_scoped("status"), "event:status");
    }
}
