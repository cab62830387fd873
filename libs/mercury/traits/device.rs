use crate::error::Result;
use async_trait::async_trait;

/// Trait for the device registration collaborator
///
/// The device record is a prerequisite for opening the event channel: it
/// provides the default socket URL and must exist before the first attempt.
/// The manager calls `refresh` as a recovery side effect when the service
/// answers the handshake with an unrecognized response.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Whether a device registration currently exists
    fn registered(&self) -> bool;

    /// Create the device registration
    ///
    /// Called (and awaited) by `connect()` when `registered()` is false.
    async fn register(&self) -> Result<()>;

    /// Refresh the device registration
    ///
    /// Recovery side effect for unknown-response handshake failures.
    async fn refresh(&self) -> Result<()>;

    /// Default event-channel URL provided by the registration
    fn web_socket_url(&self) -> String;

    /// Whether this device is ephemeral (guest/short-lived)
    ///
    /// Ephemeral devices ask the service to allow multiple concurrent
    /// connections for the same registration.
    fn ephemeral(&self) -> bool {
        false
    }
}
