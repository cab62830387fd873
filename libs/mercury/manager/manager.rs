use crate::core::backoff::{self, AttemptError, BackoffPolicy, RetryHandle};
use crate::core::socket::{Socket, SocketEvent, SocketOptions};
use crate::core::url::{build_connection_url, ConnectionUrlContext};
use crate::core::{CloseEvent, ConnectionPhase, MercuryConfig, SessionState, StateSnapshot};
use crate::manager::classify::{classify_close, CloseDisposition, PermanentKind};
use crate::manager::dispatch::dispatch_envelope;
use crate::manager::events::{topics, EventBus, Signal};
use crate::traits::*;
use crossbeam_channel::Receiver;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

type SharedConnect = Shared<BoxFuture<'static, Result<()>>>;

/// Connection manager for the real-time event channel
///
/// Owns at most one live [`Socket`] at a time. `connect()` drives the
/// backoff scheduler through repeated socket-open attempts, classifying
/// failures into retry, recovery-side-effect-then-retry, or terminal
/// abort. Once online, inbound envelopes flow to the handler registry and
/// the event bus; a close is classified as transient (reconnect with the
/// same URL) or permanent (stay offline).
///
/// Cloning shares the same underlying connection.
#[derive(Clone)]
pub struct Mercury {
    inner: Arc<MercuryInner>,
}

struct ActiveConnection {
    socket: Arc<Socket>,
    /// Set before an explicit close so queued events are never dispatched
    /// after `disconnect()` resolves
    gate: Arc<AtomicBool>,
    /// Identity of this connection; guards against a stale close event
    /// acting on a successor connection
    epoch: u64,
    forward: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

struct MercuryInner {
    config: MercuryConfig,
    device: Arc<dyn DeviceProvider>,
    credentials: Arc<dyn CredentialsProvider>,
    features: Arc<dyn FeatureCatalog>,
    services: Arc<dyn ServiceCatalog>,
    handlers: HandlerRegistry,
    bus: EventBus,
    state: SessionState,
    active: Mutex<Option<ActiveConnection>>,
    in_flight: Mutex<Option<SharedConnect>>,
    retry_handle: Mutex<Option<RetryHandle>>,
    sequence: AtomicU64,
}

impl Mercury {
    pub fn new(
        config: MercuryConfig,
        device: Arc<dyn DeviceProvider>,
        credentials: Arc<dyn CredentialsProvider>,
        features: Arc<dyn FeatureCatalog>,
        services: Arc<dyn ServiceCatalog>,
    ) -> Self {
        Self {
            inner: Arc::new(MercuryInner {
                config,
                device,
                credentials,
                features,
                services,
                handlers: HandlerRegistry::new(),
                bus: EventBus::new(),
                state: SessionState::new(),
                active: Mutex::new(None),
                in_flight: Mutex::new(None),
                retry_handle: Mutex::new(None),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    /// The handler registration table, populated by collaborators at
    /// startup
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// Subscribe to a signal topic (see [`topics`])
    pub fn subscribe(&self, topic: impl Into<String>) -> Receiver<Signal> {
        self.inner.bus.subscribe(topic)
    }

    /// Immutable view of the session state
    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.state.snapshot()
    }

    #[inline]
    pub fn connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    #[inline]
    pub fn connecting(&self) -> bool {
        self.inner.state.is_connecting()
    }

    /// Open the event channel
    ///
    /// No-op when already connected. Concurrent callers while a connect
    /// sequence is in flight attach to the same operation; exactly one
    /// backoff sequence and at most one socket open run at a time.
    ///
    /// Resolves once online; rejects only for terminal failures (abort,
    /// retries exceeded, unrecoverable handshake verdicts, registration
    /// failure). Transient retries surface through `connection_failed`
    /// signals and the snapshot's `last_error`.
    pub async fn connect(&self, url: Option<&str>) -> Result<()> {
        if self.inner.state.is_connected() {
            debug!("connect() while already connected is a no-op");
            return Ok(());
        }

        let operation = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.as_ref() {
                Some(operation) => {
                    debug!("Attaching to in-flight connect");
                    operation.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let url = url.map(str::to_string);
                    let operation: SharedConnect =
                        async move { run_connect(inner, url).await }.boxed().shared();
                    *in_flight = Some(operation.clone());
                    operation
                }
            }
        };

        operation.await
    }

    /// Tear the channel down
    ///
    /// Aborts any in-flight connect sequence (its `connect()` future
    /// rejects with [`MercuryError::Aborted`] and no further socket
    /// opens), closes the active socket, and guarantees no inbound
    /// dispatch happens after this resolves. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(handle) = self.inner.retry_handle.lock().take() {
            debug!("Aborting in-flight connect");
            handle.abort();
        }

        let active = self.inner.active.lock().take();
        if let Some(connection) = active {
            connection.gate.store(true, Ordering::Release);
            connection.socket.close().await;
            // The forwarding task drains to the closed channel and exits;
            // joining it guarantees no dispatch lands after we resolve
            let forward = connection.forward.lock().take();
            if let Some(task) = forward {
                let _ = task.await;
            }
            self.inner.state.set_phase(ConnectionPhase::Disconnected);
            info!("Event channel disconnected");
        }
        Ok(())
    }
}

impl MercuryInner {
    fn retry_policy(&self) -> BackoffPolicy {
        let max_retries = if self.state.has_ever_connected() {
            self.config.max_retries
        } else {
            self.config.initial_connection_max_retries.or(self.config.max_retries)
        };
        BackoffPolicy::new(
            self.config.backoff_time_reset,
            self.config.backoff_time_max,
            max_retries,
        )
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }
}

/// One full connect sequence: prerequisite registration, then the backoff
/// scheduler driving socket-open attempts.
async fn run_connect(inner: Arc<MercuryInner>, url: Option<String>) -> Result<()> {
    inner.state.set_phase(ConnectionPhase::Connecting);
    info!("Starting event-channel connect");

    if !inner.device.registered() {
        debug!("No device registration yet, registering");
        if let Err(e) = inner.device.register().await {
            error!("Device registration failed: {}", e);
            return finish_connect(&inner, Err(e));
        }
    }

    let policy = inner.retry_policy();
    let handle = RetryHandle::new();
    *inner.retry_handle.lock() = Some(handle.clone());

    let attempt_inner = Arc::clone(&inner);
    let attempt_url = url.clone();
    let result = backoff::run(
        &policy,
        &handle,
        move |attempt| {
            let inner = Arc::clone(&attempt_inner);
            let url = attempt_url.clone();
            async move { attempt_connect(inner, url, attempt).await }
        },
        |attempt, failure| {
            if let Some(failure) = failure {
                // Network-shaped failures are muted once retries have
                // started, to keep telemetry quiet during outages
                let suppress = failure.is_network_shaped() && attempt > 0;
                if !suppress {
                    inner.bus.emit(
                        topics::CONNECTION_FAILED,
                        Signal::ConnectionFailed {
                            attempt,
                            reason: failure.to_string(),
                        },
                    );
                }
            }
        },
    )
    .await;

    inner.retry_handle.lock().take();

    match result {
        Ok((socket, events, url)) => {
            let socket = Arc::new(socket);
            let gate = Arc::new(AtomicBool::new(false));
            let forward = Arc::new(Mutex::new(None));
            let epoch = inner.next_sequence();

            // Activation is atomic with the abort check: a disconnect()
            // that raced the final attempt either sees the stored
            // connection and closes it, or aborted first and we stand down
            let activated = {
                let mut active = inner.active.lock();
                if handle.is_aborted() {
                    false
                } else {
                    *active = Some(ActiveConnection {
                        socket: Arc::clone(&socket),
                        gate: Arc::clone(&gate),
                        epoch,
                        forward: Arc::clone(&forward),
                    });
                    inner.state.set_phase(ConnectionPhase::Connected);
                    true
                }
            };
            if !activated {
                socket.close().await;
                return finish_connect(&inner, Err(MercuryError::Aborted));
            }

            let task = tokio::spawn(forward_events(Arc::clone(&inner), events, epoch, url, gate));
            *forward.lock() = Some(task);

            info!("Event channel online");
            inner.bus.emit(topics::ONLINE, Signal::Online);
            finish_connect(&inner, Ok(()))
        }
        Err(e) => {
            warn!("Event-channel connect failed: {}", e);
            finish_connect(&inner, Err(e))
        }
    }
}

/// Terminal bookkeeping shared by every exit path of `run_connect`: the
/// in-flight slot empties the moment the result is decided, so a later
/// `connect()` starts a fresh sequence instead of observing a stale one.
fn finish_connect(inner: &MercuryInner, result: Result<()>) -> Result<()> {
    if let Err(e) = &result {
        inner.state.record_error(e.clone());
        inner.state.set_phase(ConnectionPhase::Disconnected);
    }
    inner.in_flight.lock().take();
    result
}

/// One socket-open attempt: build the URL, fetch a token, open the socket,
/// classify any failure.
async fn attempt_connect(
    inner: Arc<MercuryInner>,
    url_override: Option<String>,
    attempt: u32,
) -> std::result::Result<(Socket, mpsc::UnboundedReceiver<SocketEvent>, String), AttemptError> {
    let base = url_override.unwrap_or_else(|| inner.device.web_socket_url());

    let high_availability = inner.features.is_enabled(FeatureFlag::HighAvailability).await;
    let shared_socket = inner.features.is_enabled(FeatureFlag::SharedSocket).await;

    let base = if high_availability {
        match inner.services.priority_host_url(&base).await {
            Ok(converted) => converted,
            Err(e) => {
                warn!("Priority-host conversion failed, using '{}': {}", base, e);
                base
            }
        }
    } else {
        base
    };

    let url = build_connection_url(&ConnectionUrlContext {
        base: &base,
        shared_socket,
        ephemeral_device: inner.device.ephemeral(),
        overrides: &inner.config.query_overrides,
    })
    .map_err(AttemptError::Fatal)?;

    let token = match inner.credentials.user_token().await {
        Ok(token) => token,
        Err(e) => {
            warn!("Token fetch failed before attempt {}: {}", attempt, e);
            return Err(AttemptError::Retry(e));
        }
    };

    let options = SocketOptions {
        ping_interval: inner.config.ping_interval,
        pong_timeout: inner.config.pong_timeout,
        force_close_delay: inner.config.force_close_delay,
        token,
        tracking_id: format!("{}_{}", inner.config.tracking_prefix, inner.next_sequence()),
        headers: inner.config.socket_headers.clone(),
    };

    match Socket::open(&url, options).await {
        Ok((socket, events)) => {
            debug!("Attempt {} connected to {}", attempt, url);
            Ok((socket, events, url))
        }
        Err(e) => Err(classify_attempt_failure(&inner, &url, e).await),
    }
}

/// Turn a failed attempt into a scheduler directive, running the
/// associated recovery side effect first. Side-effect failures are logged
/// and do not change the classification.
async fn classify_attempt_failure(
    inner: &MercuryInner,
    url: &str,
    error: MercuryError,
) -> AttemptError {
    match &error {
        MercuryError::UnknownResponse(_) => {
            warn!("Unrecognized handshake response, refreshing device before retry");
            if let Err(e) = inner.device.refresh().await {
                warn!("Device refresh failed: {}", e);
            }
            AttemptError::Retry(error)
        }
        MercuryError::Unauthorized(_) => {
            warn!("Handshake unauthorized, forcing credential refresh before retry");
            if let Err(e) = inner.credentials.refresh(true).await {
                warn!("Credential refresh failed: {}", e);
            }
            AttemptError::Retry(error)
        }
        MercuryError::BadRequest(_) | MercuryError::Forbidden(_) => {
            error!("Unrecoverable handshake failure: {}", error);
            AttemptError::Fatal(error)
        }
        MercuryError::ConnectionFailure(_) => {
            if inner.features.is_enabled(FeatureFlag::HighAvailability).await {
                if let Err(e) = inner.services.mark_failed_url(url).await {
                    warn!("Could not report failed URL '{}': {}", url, e);
                }
            }
            AttemptError::Retry(error)
        }
        _ => AttemptError::Retry(error),
    }
}

/// Forward socket events to dispatch, in delivery order, until the socket
/// closes or the connection is gated off by `disconnect()`.
async fn forward_events(
    inner: Arc<MercuryInner>,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    epoch: u64,
    url: String,
    gate: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        if gate.load(Ordering::Acquire) {
            break;
        }
        match event {
            SocketEvent::Message(envelope) => {
                dispatch_envelope(&inner.handlers, &inner.bus, envelope);
            }
            SocketEvent::SequenceMismatch { expected, actual } => {
                debug!("Sequence mismatch: expected {}, got {}", expected, actual);
                inner.bus.emit(
                    topics::SEQUENCE_MISMATCH,
                    Signal::SequenceMismatch { expected, actual },
                );
            }
            SocketEvent::PongLatency(latency) => {
                inner
                    .bus
                    .emit(topics::PING_PONG_LATENCY, Signal::PingPongLatency(latency));
            }
            SocketEvent::Closed(close) => {
                on_close(&inner, epoch, &url, close);
                break;
            }
        }
    }
    debug!("Event forwarding stopped for connection {}", epoch);
}

/// Handle a transport-initiated close: go offline, classify, and either
/// reconnect with the same URL or stay down.
fn on_close(inner: &Arc<MercuryInner>, epoch: u64, url: &str, close: CloseEvent) {
    let owned = {
        let mut active = inner.active.lock();
        match active.as_ref() {
            Some(connection) if connection.epoch == epoch => active.take(),
            _ => None,
        }
    };
    if owned.is_none() {
        debug!("Ignoring close for a connection no longer active");
        return;
    }

    inner.state.record_error(MercuryError::ConnectionClosed(format!(
        "{} {}",
        close.code, close.reason
    )));
    inner.state.set_phase(ConnectionPhase::Disconnected);
    info!("Event channel offline: {} '{}'", close.code, close.reason);
    inner.bus.emit(topics::OFFLINE, Signal::Offline(close.clone()));

    match classify_close(&close, &inner.config.normal_reconnect_reasons) {
        CloseDisposition::Transient => {
            inner
                .bus
                .emit(topics::OFFLINE_TRANSIENT, Signal::Offline(close));
            info!("Close is transient, reconnecting");
            let mercury = Mercury {
                inner: Arc::clone(inner),
            };
            let url = url.to_string();
            tokio::spawn(async move {
                if let Err(e) = mercury.connect(Some(&url)).await {
                    error!("Reconnect failed: {}", e);
                }
            });
        }
        CloseDisposition::Permanent(kind) => {
            let topic = match kind {
                PermanentKind::Replaced => topics::OFFLINE_REPLACED,
                PermanentKind::Rejected | PermanentKind::Other => topics::OFFLINE_PERMANENT,
            };
            inner.bus.emit(topic, Signal::Offline(close));
            info!("Close is permanent, staying offline");
        }
    }
}
