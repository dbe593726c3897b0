//! mDNS/DNS-SD service discovery implementation

use crate::discovery::types::{qualified_service_type, DiscoveredService, DiscoveryEvent};
use crate::discovery::{DiscoveryBackend, BROWSE_CHANNEL_CAPACITY};
use anyhow::Result;
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo as MdnsServiceInfo, TxtProperties};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tokio::sync::mpsc;

/// Shared handle on the mdns-sd daemon.
///
/// One daemon serves both browsing and advertising; clones share it.
#[derive(Clone)]
pub struct MdnsDaemon {
    daemon: ServiceDaemon,
}

impl MdnsDaemon {
    /// Create the daemon and its background thread
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()?;
        Ok(Self { daemon })
    }

    pub(crate) fn inner(&self) -> &ServiceDaemon {
        &self.daemon
    }

    /// Shut the daemon down
    pub fn shutdown(&self) -> Result<()> {
        self.daemon.shutdown()?;
        Ok(())
    }
}

/// mDNS-based discovery backend
#[derive(Clone)]
pub struct MdnsBrowser {
    daemon: MdnsDaemon,
}

impl MdnsBrowser {
    /// Create a browser on top of a shared daemon
    pub fn new(daemon: MdnsDaemon) -> Self {
        Self { daemon }
    }

    /// Forward daemon events to the consumer until either side goes away
    async fn browse_loop(
        receiver: mdns_sd::Receiver<ServiceEvent>,
        tx: mpsc::Sender<DiscoveryEvent>,
        service_type: &str,
    ) {
        loop {
            let event = tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!(service_type, "Browse consumer dropped");
                    return;
                }
                event = receiver.recv_async() => event,
            };

            match event {
                Ok(ServiceEvent::SearchStopped(_)) => {
                    tracing::debug!(service_type, "mDNS search stopped");
                    return;
                }
                Ok(event) => {
                    if let Some(event) = Self::map_event(event, service_type) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(service_type, "mDNS browse channel closed: {}", e);
                    return;
                }
            }
        }
    }

    /// Translate a daemon event into a discovery event
    fn map_event(event: ServiceEvent, service_type: &str) -> Option<DiscoveryEvent> {
        match event {
            ServiceEvent::ServiceFound(_, fullname) => {
                tracing::debug!(fullname = %fullname, "Service found (pending resolution)");
                let name = Self::instance_name(&fullname, service_type);
                Some(DiscoveryEvent::Discovered(DiscoveredService::stub(
                    fullname, name,
                )))
            }
            ServiceEvent::ServiceResolved(info) => {
                Some(DiscoveryEvent::Resolved(Self::parse_service_info(&info, service_type)))
            }
            ServiceEvent::ServiceRemoved(_, fullname) => Some(DiscoveryEvent::Removed(fullname)),
            _ => None,
        }
    }

    /// Parse mDNS service info into a resolved service
    fn parse_service_info(info: &MdnsServiceInfo, service_type: &str) -> DiscoveredService {
        let fullname = info.get_fullname().to_string();

        // IPv4 first so the first address is the one most likely reachable
        let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        addresses.sort_by_key(|addr| (addr.is_ipv6(), *addr));

        DiscoveredService {
            name: Self::instance_name(&fullname, service_type),
            key: fullname,
            host: info.get_hostname().to_string(),
            port: info.get_port(),
            addresses,
            txt: Self::parse_txt_records(info.get_properties()),
        }
    }

    /// Parse TXT records into key-value pairs
    fn parse_txt_records(properties: &TxtProperties) -> BTreeMap<String, Option<Vec<u8>>> {
        properties
            .iter()
            .map(|prop| (prop.key().to_string(), prop.val().map(<[u8]>::to_vec)))
            .collect()
    }

    /// Extract the instance label from a full service name
    fn instance_name(fullname: &str, service_type: &str) -> String {
        fullname
            .strip_suffix(service_type)
            .map(|name| name.trim_end_matches('.').to_string())
            .unwrap_or_else(|| fullname.split('.').next().unwrap_or(fullname).to_string())
    }
}

#[async_trait]
impl DiscoveryBackend for MdnsBrowser {
    async fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<DiscoveryEvent>> {
        let service_type = qualified_service_type(service_type);
        let receiver = self.daemon.inner().browse(&service_type)?;
        let (tx, rx) = mpsc::channel(BROWSE_CHANNEL_CAPACITY);
        let daemon = self.daemon.clone();

        tokio::spawn(async move {
            Self::browse_loop(receiver, tx, &service_type).await;
            if let Err(e) = daemon.inner().stop_browse(&service_type) {
                tracing::debug!(service_type = %service_type, "Failed to stop browse: {}", e);
            }
        });

        Ok(rx)
    }

    async fn resolve(&self, stub: &DiscoveredService) -> Result<()> {
        // mdns-sd resolves every found instance on its own and reports the
        // record on the browse receiver
        tracing::debug!(key = %stub.key, "Resolution pending on browse stream");
        Ok(())
    }
}
