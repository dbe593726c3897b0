//! Announcing our own service over mDNS

use crate::discovery::mdns::MdnsDaemon;
use crate::discovery::types::{qualified_service_type, AdvertisedService};
use crate::discovery::ServicePublisher;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mdns_sd::ServiceInfo as MdnsServiceInfo;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(3);

/// Advertises one service instance and reports whether it is registered
pub struct MdnsAdvertiser {
    daemon: MdnsDaemon,
    service: AdvertisedService,
    /// Full name of the registered instance, if any
    service_handle: Mutex<Option<String>>,
    status: watch::Sender<bool>,
}

impl MdnsAdvertiser {
    pub fn new(daemon: MdnsDaemon, service: AdvertisedService) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            daemon,
            service,
            service_handle: Mutex::new(None),
            status,
        }
    }

    /// Service being advertised
    pub fn service(&self) -> &AdvertisedService {
        &self.service
    }

    /// Create mDNS service info from our AdvertisedService
    fn create_mdns_service_info(service: &AdvertisedService) -> Result<MdnsServiceInfo> {
        let service_type = qualified_service_type(&service.service_type);
        let hostname = format!(
            "{}.local.",
            gethostname::gethostname().to_string_lossy().trim_end_matches(".local")
        );

        let properties: Vec<(&str, &str)> = service
            .txt
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let addresses = Self::get_local_addresses().unwrap_or_else(|e| {
            tracing::warn!("Could not list local interfaces: {}", e);
            Vec::new()
        });
        let ip_list = addresses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let info = MdnsServiceInfo::new(
            &service_type,
            &service.instance_name,
            &hostname,
            ip_list.as_str(),
            service.port,
            &properties[..],
        )?;

        // Let the daemon pick addresses when none were found up front
        Ok(if addresses.is_empty() {
            info.enable_addr_auto()
        } else {
            info
        })
    }

    /// Get local IP addresses (excluding loopback)
    fn get_local_addresses() -> Result<Vec<IpAddr>> {
        let mut addresses = Vec::new();

        for iface in if_addrs::get_if_addrs()? {
            if !iface.is_loopback() {
                addresses.push(iface.ip());
            }
        }

        Ok(addresses)
    }
}

#[async_trait]
impl ServicePublisher for MdnsAdvertiser {
    async fn register(&self) -> Result<()> {
        let mut handle = self.service_handle.lock().await;
        if let Some(fullname) = handle.as_ref() {
            tracing::debug!(fullname = %fullname, "Already registered");
            return Ok(());
        }

        let registered = Self::create_mdns_service_info(&self.service).and_then(|info| {
            let fullname = info.get_fullname().to_string();
            self.daemon.inner().register(info)?;
            Ok(fullname)
        });

        match registered {
            Ok(fullname) => {
                tracing::info!(fullname = %fullname, port = self.service.port, "Service registered");
                *handle = Some(fullname);
                self.status.send_replace(true);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to register service: {}", e);
                Err(e)
            }
        }
    }

    async fn unregister(&self) -> Result<()> {
        let Some(fullname) = self.service_handle.lock().await.take() else {
            tracing::debug!("Not registered, nothing to unregister");
            return Ok(());
        };

        let result = match self.daemon.inner().unregister(&fullname) {
            Ok(receiver) => {
                match tokio::time::timeout(UNREGISTER_TIMEOUT, receiver.recv_async()).await {
                    Ok(Ok(status)) => {
                        tracing::info!(fullname = %fullname, ?status, "Service unregistered");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(anyhow!("unregister status channel closed: {}", e)),
                    Err(_) => Err(anyhow!("timed out unregistering {}", fullname)),
                }
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            tracing::warn!("Unregister did not complete cleanly: {}", e);
        }
        self.status.send_replace(false);
        result
    }

    fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mdns_service_info() {
        let service = AdvertisedService {
            instance_name: "rust-test".to_string(),
            ..AdvertisedService::default()
        };
        let info = MdnsAdvertiser::create_mdns_service_info(&service).unwrap();
        assert_eq!(info.get_fullname(), "rust-test._http._tcp.local.");
        assert_eq!(info.get_port(), 8080);
        assert_eq!(info.get_property_val_str("key1"), Some("value1"));
        assert!(info.get_hostname().ends_with(".local."));
    }
}
