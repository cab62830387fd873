//! Transport-level socket for the event channel
//!
//! One `Socket` owns one physical WebSocket connection. A dedicated reader
//! task drives the stream and emits [`SocketEvent`]s in delivery order:
//! parsed envelopes, sequence-gap diagnostics, ping/pong latency samples,
//! and finally exactly one `Closed` event.
//!
//! Liveness: a heartbeat ping goes out every `ping_interval`; if no pong
//! arrives within `pong_timeout` the socket force-closes itself with a
//! close event the manager recognizes as transient (`"pong not
//! received"`). A pong whose payload does not match the outstanding ping
//! closes with `"pong mismatch"`.

use crate::heartbeat::spawn_heartbeat;
use crate::pong_tracker::PongTracker;
use crate::traits::{Envelope, MercuryError, Result, Token};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, warn};

/// Options for one socket open
#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub force_close_delay: Duration,
    pub token: Token,
    pub tracking_id: String,
    /// Extra handshake headers merged on top of the defaults
    pub headers: HashMap<String, String>,
}

/// Close frame (or synthesized equivalent) received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Events emitted by the reader task, in transport-delivery order
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// One inbound envelope
    Message(Envelope),
    /// Sequence-number gap; diagnostic only, the connection stays up
    SequenceMismatch { expected: u64, actual: u64 },
    /// Ping→pong round-trip sample
    PongLatency(Duration),
    /// The connection ended; always the final event
    Closed(CloseEvent),
}

#[derive(Debug)]
enum SocketCommand {
    Close,
}

/// One live transport connection
///
/// Dropping the socket aborts its reader task.
pub struct Socket {
    url: String,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    detached: Arc<AtomicBool>,
    force_close_delay: Duration,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Socket {
    /// Open a connection and start the reader task
    ///
    /// Resolves once the handshake completes and the socket is ready to
    /// receive. Handshake failures come back as classified errors, never
    /// panics, so callers can always branch on the failure mode.
    pub async fn open(
        url: &str,
        options: SocketOptions,
    ) -> Result<(Socket, mpsc::UnboundedReceiver<SocketEvent>)> {
        let mut request = url
            .into_client_request()
            .map_err(|e| MercuryError::Configuration(format!("invalid socket URL: {}", e)))?;

        let headers = request.headers_mut();
        match options.token.authorization_value().parse() {
            Ok(value) => {
                headers.insert(http::header::AUTHORIZATION, value);
            }
            Err(_) => {
                return Err(MercuryError::Configuration(
                    "authorization token is not a valid header value".to_string(),
                ))
            }
        }
        if let Ok(value) = options.tracking_id.parse() {
            headers.insert("trackingid", value);
        }
        for (key, value) in &options.headers {
            match key.parse::<http::header::HeaderName>() {
                Ok(name) => match value.parse::<http::header::HeaderValue>() {
                    Ok(value) => {
                        headers.insert(name, value);
                    }
                    Err(_) => warn!("Invalid header value for key '{}'", key),
                },
                Err(_) => warn!("Invalid header name: {}", key),
            }
        }

        debug!("Opening socket to {} ({})", url, options.tracking_id);
        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(classify_handshake_error)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let detached = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_socket(
            ws_stream,
            options.clone(),
            event_tx,
            command_rx,
            Arc::clone(&detached),
        ));

        Ok((
            Socket {
                url: url.to_string(),
                command_tx,
                detached,
                force_close_delay: options.force_close_delay,
                task: Mutex::new(Some(task)),
            },
            event_rx,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Close the connection; best-effort and infallible
    ///
    /// Detaches the event stream first, so no `Message` or `Closed` events
    /// are delivered after this call, then asks the reader task to send a
    /// close frame and waits up to the force-close delay for it to wind
    /// down before abandoning it.
    pub async fn close(&self) {
        self.detached.store(true, Ordering::Release);
        let _ = self.command_tx.send(SocketCommand::Close);

        let task = self.task.lock().take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            let grace = self.force_close_delay + Duration::from_millis(500);
            if tokio::time::timeout(grace, task).await.is_err() {
                debug!("Socket reader did not stop within {:?}, aborting", grace);
                abort.abort();
            }
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.detached.store(true, Ordering::Release);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Map a handshake failure onto the manager's recovery taxonomy
fn classify_handshake_error(error: tungstenite::Error) -> MercuryError {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            match status.as_u16() {
                401 | 407 => MercuryError::Unauthorized(format!("handshake returned {}", status)),
                400 => MercuryError::BadRequest(format!("handshake returned {}", status)),
                403 => MercuryError::Forbidden(format!("handshake returned {}", status)),
                _ => MercuryError::UnknownResponse(format!("handshake returned {}", status)),
            }
        }
        tungstenite::Error::Io(e) => MercuryError::ConnectionFailure(e.to_string()),
        tungstenite::Error::Tls(e) => MercuryError::ConnectionFailure(e.to_string()),
        tungstenite::Error::Url(e) => MercuryError::Configuration(e.to_string()),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            MercuryError::ConnectionFailure("connection closed during handshake".to_string())
        }
        other => MercuryError::WebSocket(other.to_string()),
    }
}

fn emit(
    event_tx: &mpsc::UnboundedSender<SocketEvent>,
    detached: &AtomicBool,
    event: SocketEvent,
) {
    if !detached.load(Ordering::Acquire) {
        let _ = event_tx.send(event);
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Reader task: owns the stream until close
async fn run_socket(
    ws_stream: WsStream,
    options: SocketOptions,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    detached: Arc<AtomicBool>,
) {
    let (mut write, mut read) = ws_stream.split();
    let tracker = PongTracker::new(options.pong_timeout);
    let (_hb_task, hb_shutdown, mut ticks) = spawn_heartbeat(options.ping_interval);

    let mut last_sequence: Option<u64> = None;
    let mut outstanding_ping: Option<Vec<u8>> = None;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        let deadline = pong_deadline;
        let liveness = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_envelope(text.as_bytes(), &mut last_sequence, &event_tx, &detached);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        handle_envelope(&data, &mut last_sequence, &event_tx, &detached);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            emit(&event_tx, &detached, SocketEvent::Closed(CloseEvent::new(
                                1006,
                                "connection dropped while answering ping",
                            )));
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(payload))) => {
                        if let Some(latency) = tracker.record_pong_received() {
                            emit(&event_tx, &detached, SocketEvent::PongLatency(latency));
                        }
                        let expected = outstanding_ping.take();
                        pong_deadline = None;
                        if let Some(expected) = expected {
                            if payload != expected {
                                warn!("Pong payload does not match outstanding ping");
                                force_close(&mut write, &event_tx, &detached, "pong mismatch").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let close = frame
                            .map(|f| CloseEvent::new(f.code.into(), f.reason.to_string()))
                            .unwrap_or_else(|| CloseEvent::new(1005, ""));
                        debug!("Socket closed by peer: {} '{}'", close.code, close.reason);
                        emit(&event_tx, &detached, SocketEvent::Closed(close));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Socket read error: {}", e);
                        emit(&event_tx, &detached, SocketEvent::Closed(CloseEvent::new(
                            1006,
                            e.to_string(),
                        )));
                        break;
                    }
                    None => {
                        debug!("Socket stream ended without a close frame");
                        emit(&event_tx, &detached, SocketEvent::Closed(CloseEvent::new(
                            1006,
                            "connection dropped abnormally",
                        )));
                        break;
                    }
                }
            }

            Some(ordinal) = ticks.recv() => {
                let payload = ordinal.to_string().into_bytes();
                if write.send(Message::Ping(payload.clone())).await.is_err() {
                    emit(&event_tx, &detached, SocketEvent::Closed(CloseEvent::new(
                        1006,
                        "connection dropped while sending ping",
                    )));
                    break;
                }
                tracker.record_ping_sent();
                outstanding_ping = Some(payload);
                if pong_deadline.is_none() {
                    pong_deadline = Some(tokio::time::Instant::now() + options.pong_timeout);
                }
            }

            _ = liveness => {
                warn!("No pong within {:?}, force-closing socket", options.pong_timeout);
                force_close(&mut write, &event_tx, &detached, "pong not received").await;
                break;
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(SocketCommand::Close) | None => {
                        // Explicit close: the owner already detached the
                        // event stream; send the close frame and wait for
                        // the peer (bounded by the owner's grace timeout).
                        let _ = write.send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        }))).await;
                        while let Some(msg) = read.next().await {
                            match msg {
                                Ok(Message::Close(_)) | Err(_) => break,
                                _ => {}
                            }
                        }
                        break;
                    }
                }
            }
        }
    }

    let _ = hb_shutdown.send(());
    debug!("Socket reader task exiting");
}

/// Close initiated locally because liveness failed; the manager sees the
/// same shape as a server-side normal closure with a transient reason.
async fn force_close(
    write: &mut futures::stream::SplitSink<WsStream, Message>,
    event_tx: &mpsc::UnboundedSender<SocketEvent>,
    detached: &AtomicBool,
    reason: &str,
) {
    let _ = write
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        })))
        .await;
    emit(
        event_tx,
        detached,
        SocketEvent::Closed(CloseEvent::new(1000, reason)),
    );
}

fn handle_envelope(
    raw: &[u8],
    last_sequence: &mut Option<u64>,
    event_tx: &mpsc::UnboundedSender<SocketEvent>,
    detached: &AtomicBool,
) {
    let envelope: Envelope = match serde_json::from_slice(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Dropping unparseable envelope: {}", e);
            return;
        }
    };

    if let Some(actual) = envelope.sequence_number {
        if let Some(last) = *last_sequence {
            let expected = last + 1;
            if actual != expected {
                debug!("Sequence gap: expected {}, got {}", expected, actual);
                emit(
                    event_tx,
                    detached,
                    SocketEvent::SequenceMismatch { expected, actual },
                );
            }
        }
        *last_sequence = Some(actual);
    }

    emit(event_tx, detached, SocketEvent::Message(envelope));
}
