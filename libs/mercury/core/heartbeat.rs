//! Heartbeat ticker for the event-channel socket
//!
//! A dedicated task emits numbered ticks at the configured interval; the
//! socket's reader task turns each tick into a Ping frame carrying the
//! ordinal as payload, so a pong can be matched back to the ping that
//! prompted it.
//!
//! The task shuts down when signalled or when the socket side of the tick
//! channel is dropped.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Heartbeat loop body; runs until shutdown or channel closure
pub async fn heartbeat_task(
    interval: Duration,
    tick_tx: mpsc::UnboundedSender<u64>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the immediate first tick - wait a full interval before pinging
    ticker.tick().await;
    // If ticks are missed under load, skip them rather than bursting
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("Heartbeat task started with interval {:?}", interval);

    let mut ordinal: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Heartbeat task received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                ordinal += 1;
                if tick_tx.send(ordinal).is_err() {
                    debug!("Heartbeat channel closed, stopping heartbeat task");
                    break;
                }
            }
        }
    }

    debug!("Heartbeat task exiting");
}

/// Spawn the heartbeat task
///
/// Returns the task handle, the shutdown trigger, and the tick stream.
pub fn spawn_heartbeat(
    interval: Duration,
) -> (
    tokio::task::JoinHandle<()>,
    oneshot::Sender<()>,
    mpsc::UnboundedReceiver<u64>,
) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (tick_tx, tick_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        heartbeat_task(interval, tick_tx, shutdown_rx).await;
    });

    (handle, shutdown_tx, tick_rx)
}
