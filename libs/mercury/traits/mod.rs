//! # Mercury Traits
//!
//! Collaborator interfaces and shared types for the mercury event channel.
//!
//! The connection manager consumes its surroundings through narrow traits:
//!
//! - **DeviceProvider**: device registration prerequisite and default URL
//! - **CredentialsProvider**: handshake tokens and forced refresh
//! - **FeatureCatalog**: flags that alter URL construction and recovery
//! - **ServiceCatalog**: priority-host resolution and failed-host reporting
//! - **EventHandler**: registered recipients of inbound envelopes

pub mod credentials;
pub mod device;
pub mod envelope;
pub mod error;
pub mod features;
pub mod handler;
pub mod services;

// Re-export commonly used types
pub use credentials::{CredentialsProvider, Token};
pub use device::DeviceProvider;
pub use envelope::Envelope;
pub use error::{MercuryError, Result};
pub use features::{FeatureCatalog, FeatureFlag, NoFeatures};
pub use handler::{EventHandler, HandlerRegistry};
pub use services::{NoServiceCatalog, ServiceCatalog};
