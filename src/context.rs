//! Application context built once at startup and handed to components

use crate::config::Config;
use crate::discovery::{
    DiscoveryBackend, MdnsAdvertiser, MdnsBrowser, MdnsDaemon, ServicePublisher,
};
use crate::files::FileAccessor;
use anyhow::Result;
use std::sync::Arc;

/// Everything components need, resolved up front
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub browser: Arc<dyn DiscoveryBackend>,
    pub publisher: Arc<dyn ServicePublisher>,
    daemon: Option<MdnsDaemon>,
}

impl AppContext {
    /// Wire explicit substrates, e.g. in-memory ones for tests
    pub fn new(
        config: Config,
        browser: Arc<dyn DiscoveryBackend>,
        publisher: Arc<dyn ServicePublisher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            browser,
            publisher,
            daemon: None,
        }
    }

    /// Wire the mDNS substrate: one daemon shared by browser and advertiser
    pub fn mdns(config: Config) -> Result<Self> {
        let daemon = MdnsDaemon::new()?;
        let browser = MdnsBrowser::new(daemon.clone());
        let advertiser = MdnsAdvertiser::new(daemon.clone(), config.advertised_service());
        tracing::info!(
            instance = %config.service.instance_name,
            service_type = %config.service.service_type,
            "mDNS substrate ready"
        );

        Ok(Self {
            config: Arc::new(config),
            browser: Arc::new(browser),
            publisher: Arc::new(advertiser),
            daemon: Some(daemon),
        })
    }

    /// Sandboxed file accessor rooted at the configured directory
    pub fn file_accessor(&self) -> crate::Result<FileAccessor> {
        Ok(FileAccessor::new(&self.config.files.root)?)
    }

    /// Release the mDNS daemon, if this context owns one
    pub fn shutdown(&self) {
        if let Some(daemon) = &self.daemon {
            if let Err(e) = daemon.shutdown() {
                tracing::warn!("Failed to shut down mDNS daemon: {}", e);
            }
        }
    }
}
