//! In-memory set of discovered services

use crate::discovery::types::{DiscoveredService, DiscoveryEvent};
use std::collections::HashMap;

/// Discovered services keyed by service key.
///
/// Owned by exactly one task, so no locking. Iteration order is the
/// `HashMap`'s and is not stable across updates; use
/// [`ServiceRegistry::sorted_services`] when ordering matters.
#[derive(Debug, Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, DiscoveredService>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `service.key`
    pub fn upsert(&mut self, service: DiscoveredService) {
        self.services.insert(service.key.clone(), service);
    }

    /// Remove an entry, returning it if it was present
    pub fn remove(&mut self, key: &str) -> Option<DiscoveredService> {
        self.services.remove(key)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.services.clear();
    }

    /// Look up a service by key
    pub fn get(&self, key: &str) -> Option<&DiscoveredService> {
        self.services.get(key)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Snapshot of all entries in natural iteration order
    pub fn services(&self) -> Vec<DiscoveredService> {
        self.services.values().cloned().collect()
    }

    /// Snapshot of all entries ordered by key
    pub fn sorted_services(&self) -> Vec<DiscoveredService> {
        let mut services = self.services();
        services.sort_by(|a, b| a.key.cmp(&b.key));
        services
    }

    /// Apply the registry half of a discovery event.
    ///
    /// `Discovered` stubs are not stored; they only become entries once
    /// resolved. Returns true if the registry changed.
    pub fn apply(&mut self, event: &DiscoveryEvent) -> bool {
        match event {
            DiscoveryEvent::Discovered(_) => false,
            DiscoveryEvent::Resolved(service) => {
                self.upsert(service.clone());
                true
            }
            DiscoveryEvent::Removed(key) => self.remove(key).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn create_test_service(key: &str, last_octet: u8) -> DiscoveredService {
        let mut service = DiscoveredService::stub(key, key.split('.').next().unwrap_or(key));
        service.host = "peer.local.".to_string();
        service.port = 8080;
        service.addresses = vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, last_octet))];
        service
    }

    #[test]
    fn test_discovered_then_resolved_then_removed() {
        let mut registry = ServiceRegistry::new();
        let key = "peer-a._http._tcp.local.";

        assert!(!registry.apply(&DiscoveryEvent::Discovered(DiscoveredService::stub(key, "peer-a"))));
        assert!(registry.is_empty());

        assert!(registry.apply(&DiscoveryEvent::Resolved(create_test_service(key, 10))));
        assert_eq!(registry.len(), 1);

        assert!(registry.apply(&DiscoveryEvent::Removed(key.to_string())));
        assert!(registry.get(key).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolved_twice_keeps_one_entry() {
        let mut registry = ServiceRegistry::new();
        let key = "peer-a._http._tcp.local.";

        registry.apply(&DiscoveryEvent::Resolved(create_test_service(key, 10)));
        registry.apply(&DiscoveryEvent::Resolved(create_test_service(key, 11)));

        assert_eq!(registry.len(), 1);
        let entry = registry.get(key).unwrap();
        assert_eq!(entry.addresses, vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 11))]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = ServiceRegistry::new();
        registry.upsert(create_test_service("a", 1));
        assert!(!registry.apply(&DiscoveryEvent::Removed("missing".to_string())));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sorted_services() {
        let mut registry = ServiceRegistry::new();
        for key in ["c", "a", "b"] {
            registry.upsert(create_test_service(key, 1));
        }
        let keys: Vec<_> = registry.sorted_services().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_clear() {
        let mut registry = ServiceRegistry::new();
        registry.upsert(create_test_service("a", 1));
        registry.upsert(create_test_service("b", 2));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.services().is_empty());
    }
}
