use crate::error::Result;
use async_trait::async_trait;

/// Trait for the service-discovery collaborator
///
/// Only consulted when the high-availability flag is enabled: URLs are
/// converted to a preferred endpoint before each attempt, and endpoints
/// that fail at the network level are reported back so the next attempt
/// avoids them.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Resolve a URL to its current priority host
    async fn priority_host_url(&self, url: &str) -> Result<String>;

    /// Report a URL whose host failed at the network level
    async fn mark_failed_url(&self, url: &str) -> Result<()>;
}

/// Catalog that returns URLs unchanged and ignores failure reports
pub struct NoServiceCatalog;

#[async_trait]
impl ServiceCatalog for NoServiceCatalog {
    async fn priority_host_url(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }

    async fn mark_failed_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }
}
