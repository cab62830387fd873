//! Close-code classification
//!
//! Decides whether a transport close is recoverable. Transient closes
//! re-enter the connect sequence with the same URL; permanent closes leave
//! the manager offline until the caller reconnects explicitly.

use crate::core::CloseEvent;

/// Policy-rejected payload; the peer will refuse a reconnect too
pub const CLOSE_CODE_REJECTED: u16 = 1003;
/// This registration was taken over by another connection
pub const CLOSE_CODE_REPLACED: u16 = 4000;

/// Outcome of classifying a close event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Reconnect with the same URL
    Transient,
    Permanent(PermanentKind),
}

/// Why a permanent close will not be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    /// Code 1003: the service rejected the connection outright
    Rejected,
    /// Code 4000: another connection replaced this one
    Replaced,
    Other,
}

/// Classify a close event
///
/// `normal_reasons` is the configured list of code-1000 reasons that mean
/// "the service wants you back" (matched case-insensitively); any other
/// normal closure is final.
pub fn classify_close(event: &CloseEvent, normal_reasons: &[String]) -> CloseDisposition {
    match event.code {
        CLOSE_CODE_REJECTED => CloseDisposition::Permanent(PermanentKind::Rejected),
        CLOSE_CODE_REPLACED => CloseDisposition::Permanent(PermanentKind::Replaced),
        1001 | 1005 | 1006 | 1011 => CloseDisposition::Transient,
        1000 => {
            let reason = event.reason.to_ascii_lowercase();
            if normal_reasons.iter().any(|r| r.to_ascii_lowercase() == reason) {
                CloseDisposition::Transient
            } else {
                CloseDisposition::Permanent(PermanentKind::Other)
            }
        }
        _ => CloseDisposition::Permanent(PermanentKind::Other),
    }
}
