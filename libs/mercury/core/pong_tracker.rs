//! Heartbeat liveness tracking
//!
//! Records ping/pong timestamps so the socket can detect a dead peer: a
//! connection is unhealthy when no pong arrives within the configured
//! timeout after a ping was sent. Also produces the ping→pong latency
//! samples surfaced as diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free ping/pong liveness tracker
///
/// Timestamps are stored as milliseconds since an internal epoch to allow
/// atomic u64 access from the reader task and the heartbeat ticker.
pub struct PongTracker {
    epoch: Instant,
    last_ping_sent_ms: AtomicU64,
    last_pong_received_ms: AtomicU64,
    timeout: Duration,
}

impl PongTracker {
    /// `timeout` is how long to wait for a pong after a ping before the
    /// connection is considered dead.
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_ping_sent_ms: AtomicU64::new(0),
            last_pong_received_ms: AtomicU64::new(0),
            timeout,
        }
    }

    /// Record a ping just sent to the peer
    pub fn record_ping_sent(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.last_ping_sent_ms.store(ms, Ordering::Release);
    }

    /// Record a pong from the peer; returns the ping→pong latency when an
    /// outstanding ping exists
    pub fn record_pong_received(&self) -> Option<Duration> {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_pong_received_ms.store(now_ms, Ordering::Release);

        let ping_ms = self.last_ping_sent_ms.load(Ordering::Acquire);
        if ping_ms == 0 || ping_ms > now_ms {
            return None;
        }
        Some(Duration::from_millis(now_ms - ping_ms))
    }

    /// False once a ping has waited longer than the timeout without a pong
    pub fn is_healthy(&self) -> bool {
        let ping_ms = self.last_ping_sent_ms.load(Ordering::Acquire);
        let pong_ms = self.last_pong_received_ms.load(Ordering::Acquire);

        // Nothing outstanding yet
        if ping_ms == 0 {
            return true;
        }
        if pong_ms >= ping_ms {
            return true;
        }

        let now_ms = self.epoch.elapsed().as_millis() as u64;
        now_ms.saturating_sub(ping_ms) < self.timeout.as_millis() as u64
    }

    /// Clear outstanding state, e.g. when a connection is replaced
    pub fn reset(&self) {
        self.last_ping_sent_ms.store(0, Ordering::Release);
        self.last_pong_received_ms.store(0, Ordering::Release);
    }
}
