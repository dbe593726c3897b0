//! State, events and side effects of the discovery-and-sync orchestrator

use crate::discovery::{DiscoveredService, DiscoveryEvent};
use serde::Serialize;

/// Observable orchestrator state.
///
/// Replaced as a whole on every change, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    /// Our service is announced
    pub registered: bool,
    /// A register or unregister request is waiting for confirmation
    pub register_in_progress: bool,
    pub selected_tab: usize,
    pub is_scanning: bool,
    /// Resolved peers, in registry iteration order (not sorted)
    pub scanned_services: Vec<DiscoveredService>,
}

impl SyncState {
    /// Scanned services ordered by key
    pub fn sorted_services(&self) -> Vec<DiscoveredService> {
        let mut services = self.scanned_services.clone();
        services.sort_by(|a, b| a.key.cmp(&b.key));
        services
    }
}

/// External stimuli
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TabSelected(usize),
    RegisterOn,
    RegisterOff,
    ScanOn,
    ScanOff,
    /// Send the liveness request to a peer
    HandShake(DiscoveredService),
}

/// Results of asynchronous work, fed back into the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSideEffect {
    RegisterConnected,
    RegisterDisconnected,
    /// A new scan begins; stale registry entries must go
    ScanStarted,
    ServiceDiscovered(DiscoveryEvent),
    /// The browse of scan number `.0` stopped on its own
    ScanEnded(u64),
    /// Body of a handshake reply, or the fallback message on failure
    HandShakeResponse(String),
}
