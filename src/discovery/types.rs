//! Common types for service discovery

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Service type browsed and announced by default
pub const DEFAULT_SERVICE_TYPE: &str = "_http._tcp";

/// Port the handshake server listens on and the advertisement carries
pub const DEFAULT_PORT: u16 = 8080;

/// A service seen on the local network.
///
/// Before resolution only `key` and `name` are meaningful; `host`, `port`
/// and `addresses` are filled in once the instance resolves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredService {
    /// Unique identifier combining instance name, type and domain
    pub key: String,
    /// Instance name
    pub name: String,
    /// Host name the instance lives on
    pub host: String,
    /// Service port number
    pub port: u16,
    /// Network addresses where the service can be reached
    pub addresses: Vec<IpAddr>,
    /// TXT record data
    pub txt: BTreeMap<String, Option<Vec<u8>>>,
}

/// Discovery events reported by a browse stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// An instance appeared but has not been resolved yet
    Discovered(DiscoveredService),
    /// An instance resolved to a full record
    Resolved(DiscoveredService),
    /// The instance with this key went away
    Removed(String),
}

/// Service information for announcement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertisedService {
    /// Service type, e.g. `_http._tcp`
    pub service_type: String,
    /// Instance name to announce
    pub instance_name: String,
    /// Port we're listening on
    pub port: u16,
    /// TXT record data
    pub txt: BTreeMap<String, String>,
}

impl DiscoveredService {
    /// Create an unresolved entry that only carries its identity
    pub fn stub(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            host: String::new(),
            port: 0,
            addresses: Vec::new(),
            txt: BTreeMap::new(),
        }
    }

    /// Whether resolution has filled in any address
    pub fn is_resolved(&self) -> bool {
        !self.addresses.is_empty()
    }

    /// Host if known, the instance name otherwise
    pub fn display_name(&self) -> &str {
        if self.host.trim().is_empty() {
            &self.name
        } else {
            &self.host
        }
    }

    /// Socket address of the first advertised address
    pub fn first_socket_addr(&self) -> Option<SocketAddr> {
        self.addresses
            .first()
            .map(|ip| SocketAddr::new(*ip, self.port))
    }

    /// TXT value decoded as UTF-8, if present
    pub fn txt_value(&self, key: &str) -> Option<String> {
        self.txt
            .get(key)
            .and_then(|v| v.as_deref())
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

impl DiscoveryEvent {
    /// Registry key the event refers to
    pub fn key(&self) -> &str {
        match self {
            DiscoveryEvent::Discovered(service) | DiscoveryEvent::Resolved(service) => &service.key,
            DiscoveryEvent::Removed(key) => key,
        }
    }
}

impl Default for AdvertisedService {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            instance_name: default_instance_name(),
            port: DEFAULT_PORT,
            txt: default_txt(),
        }
    }
}

/// Generated instance name, unique per process
pub fn default_instance_name() -> String {
    format!("rust-{}", Uuid::new_v4())
}

/// Fixed metadata carried in our TXT records
pub fn default_txt() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("key1".to_string(), "value1".to_string()),
        ("key2".to_string(), "value2".to_string()),
    ])
}

/// Normalize a service type to the fully qualified form mDNS expects
///
/// `_http._tcp` becomes `_http._tcp.local.`; already qualified names are
/// returned unchanged.
pub fn qualified_service_type(service_type: &str) -> String {
    let trimmed = service_type.trim_end_matches('.');
    if trimmed.ends_with(".local") {
        format!("{}.", trimmed)
    } else {
        format!("{}.local.", trimmed)
    }
}
