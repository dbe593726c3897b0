//! Service discovery: advertising ourselves and finding LanSync peers

pub mod advertiser;
pub mod mdns;
pub mod memory;
pub mod registry;
pub mod scanner;
pub mod types;


use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

pub use advertiser::MdnsAdvertiser;
pub use mdns::{MdnsBrowser, MdnsDaemon};
pub use memory::{MemoryBrowser, MemoryPublisher};
pub use registry::ServiceRegistry;
pub use scanner::{ScanSink, Scanner};
pub use types::{AdvertisedService, DiscoveredService, DiscoveryEvent};

/// Capacity of the channel between a browse and its consumer
pub(crate) const BROWSE_CHANNEL_CAPACITY: usize = 100;

/// Trait for discovery substrates that can browse for a service type
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Start browsing for `service_type`.
    ///
    /// Events keep arriving on the returned receiver until the browse ends.
    /// Dropping the receiver ends the browse.
    async fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<DiscoveryEvent>>;

    /// Ask the substrate to resolve a stub reported by `Discovered`.
    ///
    /// The result arrives later as `Resolved` on the browse stream.
    async fn resolve(&self, stub: &DiscoveredService) -> Result<()>;
}

/// Trait for substrates that can announce our own service
#[async_trait]
pub trait ServicePublisher: Send + Sync {
    /// Begin advertising
    async fn register(&self) -> Result<()>;

    /// Stop advertising
    async fn unregister(&self) -> Result<()>;

    /// Subscribe to the "is registered" status
    fn subscribe_status(&self) -> watch::Receiver<bool>;
}
