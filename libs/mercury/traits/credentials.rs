use crate::error::Result;
use async_trait::async_trait;

/// Bearer token handed to the socket handshake
#[derive(Debug, Clone)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Header-ready representation (`Bearer <value>` if not already prefixed)
    pub fn authorization_value(&self) -> String {
        if self.0.starts_with("Bearer ") {
            self.0.clone()
        } else {
            format!("Bearer {}", self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trait for the credentials collaborator
///
/// A fresh token is fetched for every connection attempt. When the service
/// rejects the handshake as unauthorized, the manager forces a refresh
/// before the next attempt.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Current user token for the handshake
    async fn user_token(&self) -> Result<Token>;

    /// Refresh the credential
    ///
    /// `force` bypasses any freshness check; the manager always forces when
    /// recovering from an unauthorized handshake.
    async fn refresh(&self, force: bool) -> Result<()>;
}
