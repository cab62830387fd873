use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the mercury connection manager
///
/// Defaults match the service's published limits; consumers usually only
/// override the retry budget and the socket/query extras.
#[derive(Debug, Clone)]
pub struct MercuryConfig {
    /// Interval between heartbeat pings
    pub ping_interval: Duration,

    /// How long to wait for a pong before force-closing the socket
    pub pong_timeout: Duration,

    /// How long close() waits for the peer to acknowledge before abandoning
    /// the reader task
    pub force_close_delay: Duration,

    /// Initial backoff delay (doubles per failed attempt)
    pub backoff_time_reset: Duration,

    /// Backoff delay ceiling
    pub backoff_time_max: Duration,

    /// Retry budget once a connection has ever succeeded; None = unbounded
    pub max_retries: Option<u32>,

    /// Retry budget before the first successful connection ever; None falls
    /// back to `max_retries`
    pub initial_connection_max_retries: Option<u32>,

    /// Close reasons (code 1000) treated as transient, matched
    /// case-insensitively. The service adds to this list over time, so it
    /// is configuration rather than a constant.
    pub normal_reconnect_reasons: Vec<String>,

    /// Extra HTTP headers merged on top of the handshake defaults
    pub socket_headers: HashMap<String, String>,

    /// Extra query parameters appended after flag-driven parameters
    pub query_overrides: Vec<(String, String)>,

    /// Prefix for per-attempt tracking ids
    pub tracking_prefix: String,
}

impl Default for MercuryConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(14),
            force_close_delay: Duration::from_secs(2),
            backoff_time_reset: Duration::from_secs(1),
            backoff_time_max: Duration::from_secs(32),
            max_retries: None,
            initial_connection_max_retries: None,
            normal_reconnect_reasons: vec![
                "idle".to_string(),
                "done (forced)".to_string(),
                "pong not received".to_string(),
                "pong mismatch".to_string(),
            ],
            socket_headers: HashMap::new(),
            query_overrides: Vec::new(),
            tracking_prefix: "mercury".to_string(),
        }
    }
}
