use async_trait::async_trait;

/// Feature flags that change connection behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    /// Route the connection URL through a priority host and report failed
    /// hosts back to service discovery
    HighAvailability,
    /// Share one socket across registrations; changes the query-parameter
    /// set sent during the handshake
    SharedSocket,
}

/// Trait for the feature-flag collaborator
///
/// Flags are read once per connection attempt, so a flag flip takes effect
/// on the next attempt without reconnecting explicitly.
#[async_trait]
pub trait FeatureCatalog: Send + Sync {
    /// Whether the given flag is enabled for this user/device
    async fn is_enabled(&self, flag: FeatureFlag) -> bool;
}

/// Catalog with every flag disabled
pub struct NoFeatures;

#[async_trait]
impl FeatureCatalog for NoFeatures {
    async fn is_enabled(&self, _flag: FeatureFlag) -> bool {
        false
    }
}
