//! Connection session state
//!
//! The connection phase lives in a single atomic cell, so `connected` and
//! `connecting` can never be observed true at the same time. Reads take an
//! immutable `StateSnapshot`; derived values (`listening`) are pure
//! functions recomputed on the snapshot.

use crate::traits::MercuryError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Connection phase of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionPhase {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionPhase::Connecting,
            2 => ConnectionPhase::Connected,
            _ => ConnectionPhase::Disconnected,
        }
    }
}

/// Lock-free session state owned by the connection manager
///
/// Only manager methods mutate this; collaborators observe it through
/// snapshots.
pub struct SessionState {
    phase: AtomicU8,
    /// Sticky: set on the first successful connection, never cleared.
    /// Switches the retry-limit policy from the initial-connection budget
    /// to the general one.
    has_ever_connected: AtomicBool,
    last_error: Mutex<Option<MercuryError>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(ConnectionPhase::Disconnected as u8),
            has_ever_connected: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: ConnectionPhase) {
        self.phase.store(phase as u8, Ordering::Release);
        if phase == ConnectionPhase::Connected {
            self.has_ever_connected.store(true, Ordering::Release);
        }
    }

    /// Transition only if the current phase matches `from`
    pub fn compare_exchange(
        &self,
        from: ConnectionPhase,
        to: ConnectionPhase,
    ) -> std::result::Result<(), ConnectionPhase> {
        match self.phase.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                if to == ConnectionPhase::Connected {
                    self.has_ever_connected.store(true, Ordering::Release);
                }
                Ok(())
            }
            Err(actual) => Err(ConnectionPhase::from_u8(actual)),
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Connected
    }

    #[inline]
    pub fn is_connecting(&self) -> bool {
        self.phase() == ConnectionPhase::Connecting
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.phase() == ConnectionPhase::Disconnected
    }

    #[inline]
    pub fn has_ever_connected(&self) -> bool {
        self.has_ever_connected.load(Ordering::Acquire)
    }

    pub fn record_error(&self, error: MercuryError) {
        *self.last_error.lock() = Some(error);
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            phase: self.phase(),
            has_ever_connected: self.has_ever_connected(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the session state
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub phase: ConnectionPhase,
    pub has_ever_connected: bool,
    pub last_error: Option<MercuryError>,
}

impl StateSnapshot {
    #[inline]
    pub fn connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    #[inline]
    pub fn connecting(&self) -> bool {
        self.phase == ConnectionPhase::Connecting
    }

    /// Whether the channel is delivering events; derived, not stored
    #[inline]
    pub fn listening(&self) -> bool {
        self.connected()
    }
}
