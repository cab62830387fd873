//! Exponential-backoff retry driver
//!
//! Drives a caller-supplied attempt future until it succeeds, fails
//! fatally, exceeds the retry budget, or is aborted through the
//! [`RetryHandle`]. Delays grow as `initial_delay * 2^n`, capped at
//! `max_delay`.

use crate::traits::{MercuryError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Retry policy for one connect sequence
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// None = unbounded; the caller must abort explicitly to stop
    pub max_retries: Option<u32>,
}

impl BackoffPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_retries: Option<u32>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_retries,
        }
    }

    /// Delay scheduled after the failure of attempt `n` (0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as u64;
        let delay_ms = initial_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// How a failed attempt should drive the scheduler
#[derive(Debug)]
pub enum AttemptError {
    /// Consume one retry unit and schedule the next attempt
    Retry(MercuryError),
    /// Stop immediately regardless of remaining budget
    Fatal(MercuryError),
}

impl AttemptError {
    pub fn inner(&self) -> &MercuryError {
        match self {
            AttemptError::Retry(e) | AttemptError::Fatal(e) => e,
        }
    }
}

struct RetryShared {
    aborted: AtomicBool,
    notify: Notify,
    attempt_count: AtomicU32,
}

/// Abortable handle onto a running retry sequence
///
/// Created when a connect sequence starts; `abort()` cancels the pending
/// sleep and the in-flight attempt, and the overall operation rejects with
/// [`MercuryError::Aborted`]. The attempt function is never invoked again
/// after an abort.
#[derive(Clone)]
pub struct RetryHandle {
    shared: Arc<RetryShared>,
}

impl RetryHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RetryShared {
                aborted: AtomicBool::new(false),
                notify: Notify::new(),
                attempt_count: AtomicU32::new(0),
            }),
        }
    }

    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }

    /// Attempts started so far (the current attempt included)
    pub fn attempt_count(&self) -> u32 {
        self.shared.attempt_count.load(Ordering::Acquire)
    }

    async fn wait_aborted(&self) {
        loop {
            let notified = self.shared.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for RetryHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive `attempt` under `policy` until success, fatal failure, abort, or
/// an exhausted retry budget.
///
/// `on_attempt` fires once per completed attempt with `None` on success or
/// the failure, for observability; it must not block.
///
/// Aborting drops the in-flight attempt future, cancelling any half-open
/// handshake it owns.
pub async fn run<T, F, Fut, C>(
    policy: &BackoffPolicy,
    handle: &RetryHandle,
    mut attempt: F,
    mut on_attempt: C,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
    C: FnMut(u32, Option<&MercuryError>),
{
    loop {
        if handle.is_aborted() {
            return Err(MercuryError::Aborted);
        }

        let n = handle.shared.attempt_count.fetch_add(1, Ordering::AcqRel);
        let fut = attempt(n);
        tokio::pin!(fut);

        let result = tokio::select! {
            _ = handle.wait_aborted() => {
                debug!("Attempt {} aborted while in flight", n);
                return Err(MercuryError::Aborted);
            }
            result = &mut fut => result,
        };

        match result {
            Ok(value) => {
                on_attempt(n, None);
                return Ok(value);
            }
            Err(AttemptError::Fatal(e)) => {
                on_attempt(n, Some(&e));
                debug!("Attempt {} failed fatally: {}", n, e);
                return Err(e);
            }
            Err(AttemptError::Retry(e)) => {
                on_attempt(n, Some(&e));

                if let Some(max) = policy.max_retries {
                    if n >= max {
                        return Err(MercuryError::RetriesExceeded {
                            attempts: n + 1,
                            reason: e.to_string(),
                        });
                    }
                }

                let delay = policy.delay_for(n);
                debug!("Attempt {} failed ({}); retrying in {:?}", n, e, delay);

                tokio::select! {
                    _ = handle.wait_aborted() => return Err(MercuryError::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
