//! Common test utilities for mercury integration tests
//!
//! Provides a scriptable mock WebSocket server (per-connection behavior,
//! handshake capture/rejection) and fake collaborator implementations.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use mercury::traits::{
    CredentialsProvider, DeviceProvider, FeatureCatalog, FeatureFlag, MercuryError, Result,
    ServiceCatalog, Token,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the mock server does with one accepted connection
#[derive(Debug, Clone)]
pub enum ServerBehavior {
    /// Complete the handshake, answer pings, stay open until shutdown
    Open,
    /// Complete the handshake, send these texts, then behave like `Open`
    SendMessages(Vec<String>),
    /// Send one text every `interval_ms` until the connection drops
    SendPeriodically { body: String, interval_ms: u64 },
    /// Complete the handshake, then close with the given frame
    CloseWith { code: u16, reason: String },
    /// Complete the handshake, then drop the TCP stream without a close
    /// frame (the client observes an abnormal 1006-style closure)
    DropAbruptly,
    /// Complete the handshake but never read, so pings go unanswered
    Unresponsive,
    /// Refuse the HTTP upgrade with this status code
    RejectHandshake(u16),
}

/// A scriptable mock WebSocket server
///
/// The Nth accepted connection gets the Nth behavior in the script; the
/// last behavior repeats once the script runs out.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    handshake_attempts: Arc<AtomicUsize>,
    ws_accepts: Arc<AtomicUsize>,
    captured_uris: Arc<Mutex<Vec<String>>>,
}

impl MockWsServer {
    pub async fn start(behavior: ServerBehavior) -> Self {
        Self::start_scripted(vec![behavior]).await
    }

    pub async fn start_scripted(script: Vec<ServerBehavior>) -> Self {
        assert!(!script.is_empty(), "script must have at least one behavior");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let handshake_attempts = Arc::new(AtomicUsize::new(0));
        let ws_accepts = Arc::new(AtomicUsize::new(0));
        let captured_uris = Arc::new(Mutex::new(Vec::new()));

        {
            let shutdown = Arc::clone(&shutdown);
            let handshake_attempts = Arc::clone(&handshake_attempts);
            let ws_accepts = Arc::clone(&ws_accepts);
            let captured_uris = Arc::clone(&captured_uris);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            let Ok((stream, _)) = result else { break };
                            let index = handshake_attempts.fetch_add(1, Ordering::SeqCst);
                            let behavior = script
                                .get(index)
                                .unwrap_or_else(|| script.last().unwrap())
                                .clone();
                            let shutdown = Arc::clone(&shutdown);
                            let ws_accepts = Arc::clone(&ws_accepts);
                            let captured_uris = Arc::clone(&captured_uris);
                            tokio::spawn(async move {
                                handle_connection(stream, behavior, shutdown, ws_accepts, captured_uris)
                                    .await;
                            });
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            });
        }

        Self {
            addr,
            shutdown,
            handshake_attempts,
            ws_accepts,
            captured_uris,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// TCP connections that reached the handshake stage
    pub fn handshake_attempts(&self) -> usize {
        self.handshake_attempts.load(Ordering::SeqCst)
    }

    /// Handshakes that completed successfully
    pub fn ws_accepts(&self) -> usize {
        self.ws_accepts.load(Ordering::SeqCst)
    }

    /// Request URIs (path + query) seen on accepted handshakes
    pub fn captured_uris(&self) -> Vec<String> {
        self.captured_uris.lock().clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: ServerBehavior,
    shutdown: Arc<Notify>,
    ws_accepts: Arc<AtomicUsize>,
    captured_uris: Arc<Mutex<Vec<String>>>,
) {
    if let ServerBehavior::RejectHandshake(status) = behavior {
        let callback = move |_req: &Request, _resp: Response| -> std::result::Result<Response, ErrorResponse> {
            let response = http::Response::builder()
                .status(status)
                .body(None)
                .unwrap();
            Err(response)
        };
        let _ = tokio_tungstenite::accept_hdr_async(stream, callback).await;
        return;
    }

    let capture = Arc::clone(&captured_uris);
    let callback = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
        capture.lock().push(req.uri().to_string());
        Ok(resp)
    };
    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("Mock server handshake failed: {}", e);
            return;
        }
    };
    ws_accepts.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    match behavior {
        ServerBehavior::RejectHandshake(_) => unreachable!(),
        ServerBehavior::Open => {
            serve_until_shutdown(&mut write, &mut read, shutdown).await;
        }
        ServerBehavior::SendMessages(messages) => {
            for body in messages {
                if write.send(Message::Text(body)).await.is_err() {
                    return;
                }
            }
            serve_until_shutdown(&mut write, &mut read, shutdown).await;
        }
        ServerBehavior::SendPeriodically { body, interval_ms } => {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if write.send(Message::Text(body.clone())).await.is_err() {
                            return;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                            _ => {}
                        }
                    }
                    _ = shutdown.notified() => return,
                }
            }
        }
        ServerBehavior::CloseWith { code, reason } => {
            let _ = write
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                })))
                .await;
            // Wait for the client's acknowledgement (or the stream end)
            while let Some(msg) = read.next().await {
                if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
        }
        ServerBehavior::DropAbruptly => {
            // Dropping both halves resets the TCP stream with no close frame
        }
        ServerBehavior::Unresponsive => {
            // Never read: pings pile up unanswered until the client gives up
            shutdown.notified().await;
        }
    }
}

async fn serve_until_shutdown<W, R>(write: &mut W, read: &mut R, shutdown: Arc<Notify>)
where
    W: SinkExt<Message> + Unpin,
    R: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

pub struct FakeDevice {
    registered: AtomicBool,
    pub register_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    url: Mutex<String>,
    ephemeral: AtomicBool,
}

impl FakeDevice {
    pub fn new(url: &str) -> Self {
        Self {
            registered: AtomicBool::new(true),
            register_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            url: Mutex::new(url.to_string()),
            ephemeral: AtomicBool::new(false),
        }
    }

    pub fn unregistered(url: &str) -> Self {
        let device = Self::new(url);
        device.registered.store(false, Ordering::SeqCst);
        device
    }

    pub fn set_ephemeral(&self, value: bool) {
        self.ephemeral.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceProvider for FakeDevice {
    fn registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn register(&self) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn web_socket_url(&self) -> String {
        self.url.lock().clone()
    }

    fn ephemeral(&self) -> bool {
        self.ephemeral.load(Ordering::SeqCst)
    }
}

pub struct FakeCredentials {
    pub token_fetches: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub forced_refreshes: AtomicUsize,
    pub fail_token_fetch: AtomicBool,
}

impl FakeCredentials {
    pub fn new() -> Self {
        Self {
            token_fetches: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            forced_refreshes: AtomicUsize::new(0),
            fail_token_fetch: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CredentialsProvider for FakeCredentials {
    async fn user_token(&self) -> Result<Token> {
        self.token_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_token_fetch.load(Ordering::SeqCst) {
            return Err(MercuryError::Credentials("token store offline".to_string()));
        }
        Ok(Token::new("test-token"))
    }

    async fn refresh(&self, force: bool) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced_refreshes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub struct FakeFeatures {
    pub high_availability: AtomicBool,
    pub shared_socket: AtomicBool,
}

impl FakeFeatures {
    pub fn new() -> Self {
        Self {
            high_availability: AtomicBool::new(false),
            shared_socket: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FeatureCatalog for FakeFeatures {
    async fn is_enabled(&self, flag: FeatureFlag) -> bool {
        match flag {
            FeatureFlag::HighAvailability => self.high_availability.load(Ordering::SeqCst),
            FeatureFlag::SharedSocket => self.shared_socket.load(Ordering::SeqCst),
        }
    }
}

pub struct FakeServices {
    pub conversions: AtomicUsize,
    pub marked_urls: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self {
            conversions: AtomicUsize::new(0),
            marked_urls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ServiceCatalog for FakeServices {
    async fn priority_host_url(&self, url: &str) -> Result<String> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        Ok(url.to_string())
    }

    async fn mark_failed_url(&self, url: &str) -> Result<()> {
        self.marked_urls.lock().push(url.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub mercury: mercury::Mercury,
    pub device: Arc<FakeDevice>,
    pub credentials: Arc<FakeCredentials>,
    pub features: Arc<FakeFeatures>,
    pub services: Arc<FakeServices>,
}

/// Build a manager against `url` with fast retry timing for tests
pub fn fixture(url: &str, config: mercury::MercuryConfig) -> Fixture {
    let device = Arc::new(FakeDevice::new(url));
    let credentials = Arc::new(FakeCredentials::new());
    let features = Arc::new(FakeFeatures::new());
    let services = Arc::new(FakeServices::new());

    let mercury = mercury::Mercury::new(
        config,
        Arc::clone(&device) as Arc<dyn DeviceProvider>,
        Arc::clone(&credentials) as Arc<dyn CredentialsProvider>,
        Arc::clone(&features) as Arc<dyn FeatureCatalog>,
        Arc::clone(&services) as Arc<dyn ServiceCatalog>,
    );

    Fixture {
        mercury,
        device,
        credentials,
        features,
        services,
    }
}

/// Test config with millisecond-scale backoff
pub fn fast_config() -> mercury::MercuryConfig {
    mercury::MercuryConfig {
        backoff_time_reset: std::time::Duration::from_millis(10),
        backoff_time_max: std::time::Duration::from_millis(40),
        ..mercury::MercuryConfig::default()
    }
}

/// Receive one signal or panic after `secs` seconds
pub fn recv_signal(
    rx: &crossbeam_channel::Receiver<mercury::Signal>,
    secs: u64,
    what: &str,
) -> mercury::Signal {
    rx.recv_timeout(std::time::Duration::from_secs(secs))
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}
