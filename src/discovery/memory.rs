//! In-process discovery substrate for tests and local demos.
//!
//! `MemoryBrowser` lets a test inject discovery events by hand and resolves
//! stubs from a table of known services. `MemoryPublisher` flips its status
//! immediately and counts calls so guard behaviour can be asserted.

use crate::discovery::{
    DiscoveredService, DiscoveryBackend, DiscoveryEvent, ServicePublisher, BROWSE_CHANNEL_CAPACITY,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

#[derive(Default)]
struct BrowserInner {
    /// Sender of the most recent browse
    active: Option<mpsc::Sender<DiscoveryEvent>>,
    /// Full records handed out by `resolve`, keyed by service key
    resolvable: HashMap<String, DiscoveredService>,
    browse_calls: usize,
    resolve_calls: Vec<String>,
    /// Refuse the next browses
    fail_browse: bool,
}

/// Discovery backend driven by the caller
#[derive(Clone, Default)]
pub struct MemoryBrowser {
    inner: Arc<Mutex<BrowserInner>>,
}

impl MemoryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `service` the answer to a future `resolve` of its key
    pub fn add_resolvable(&self, service: DiscoveredService) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.resolvable.insert(service.key.clone(), service);
    }

    /// Push an event into the active browse, if any.
    ///
    /// Returns false when no browse is running or its consumer is gone.
    pub async fn emit(&self, event: DiscoveryEvent) -> bool {
        let tx = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.active.clone()
        };
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Whether the current browse still has a live consumer
    pub fn is_browsing(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.active.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false)
    }

    /// Close the active browse as if the substrate stopped it
    pub fn end_browse(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).active = None;
    }

    /// Make `browse` fail until reset
    pub fn set_fail_browse(&self, fail: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).fail_browse = fail;
    }

    pub fn browse_calls(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).browse_calls
    }

    /// Keys passed to `resolve`, in call order
    pub fn resolve_calls(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolve_calls
            .clone()
    }
}

#[async_trait]
impl DiscoveryBackend for MemoryBrowser {
    async fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<DiscoveryEvent>> {
        tracing::debug!(service_type, "In-memory browse started");
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.browse_calls += 1;
        if inner.fail_browse {
            return Err(anyhow!("browse refused for {}", service_type));
        }
        let (tx, rx) = mpsc::channel(BROWSE_CHANNEL_CAPACITY);
        inner.active = Some(tx);
        Ok(rx)
    }

    async fn resolve(&self, stub: &DiscoveredService) -> Result<()> {
        let (tx, resolved) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.resolve_calls.push(stub.key.clone());
            (inner.active.clone(), inner.resolvable.get(&stub.key).cloned())
        };

        let resolved = resolved.ok_or_else(|| anyhow!("no record for {}", stub.key))?;
        let tx = tx.ok_or_else(|| anyhow!("no active browse"))?;
        tx.send(DiscoveryEvent::Resolved(resolved))
            .await
            .map_err(|_| anyhow!("browse consumer dropped"))
    }
}

/// Service publisher that reports success immediately.
///
/// Like the mDNS advertiser, registering while registered and
/// unregistering while unregistered change nothing and notify nobody.
pub struct MemoryPublisher {
    status: watch::Sender<bool>,
    register_calls: AtomicUsize,
    unregister_calls: AtomicUsize,
    /// When set, status changes are left to the test via `set_status`
    manual: bool,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// A publisher whose status only changes through `set_status`
    pub fn manual() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(manual: bool) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            status,
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
            manual,
        }
    }

    /// Publish a registration status as if the substrate reported it
    pub fn set_status(&self, registered: bool) {
        self.status.send_replace(registered);
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServicePublisher for MemoryPublisher {
    async fn register(&self) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if !self.manual && !*self.status.borrow() {
            self.set_status(true);
        }
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        if !self.manual && *self.status.borrow() {
            self.set_status(false);
        }
        Ok(())
    }

    fn subscribe_status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}
