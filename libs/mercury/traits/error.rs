use thiserror::Error;

/// Main error type for mercury
///
/// Variants are `Clone` so a terminal failure can be handed to every
/// caller sharing the same in-flight connect operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MercuryError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Handshake returned a response the client does not recognize
    #[error("Unknown handshake response: {0}")]
    UnknownResponse(String),

    /// Handshake rejected with an expired or invalid credential
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Handshake rejected as malformed (service accounts without entitlement)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Handshake rejected as forbidden / not entitled
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Network-level connection failure
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Device registration failed
    #[error("Device registration failed: {0}")]
    Registration(String),

    /// Credential lookup or refresh failed
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Connect sequence aborted by disconnect()
    #[error("Connection attempt aborted")]
    Aborted,

    /// Retry budget exhausted
    #[error("Retries exceeded after {attempts} attempts: {reason}")]
    RetriesExceeded { attempts: u32, reason: String },

    /// Message parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl MercuryError {
    /// True for failures that look like network-level outages rather than
    /// server verdicts. Used to keep telemetry quiet during outages.
    pub fn is_network_shaped(&self) -> bool {
        matches!(
            self,
            MercuryError::ConnectionFailure(_) | MercuryError::ConnectionClosed(_)
        )
    }
}

/// Result type for mercury operations
pub type Result<T> = std::result::Result<T, MercuryError>;
