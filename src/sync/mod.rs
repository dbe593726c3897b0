//! Discovery-and-sync orchestrator.
//!
//! [`SyncEngine`] ties the advertiser, the scanner, the discovered-service
//! registry and the handshake client/server to one [`Store`]. Events change
//! what is running; effects coming back from that work are folded into
//! [`SyncState`].

pub mod state;


use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

pub use state::{SyncEvent, SyncSideEffect, SyncState};

use crate::context::AppContext;
use crate::discovery::{
    DiscoveredService, DiscoveryBackend, DiscoveryEvent, ScanSink, Scanner, ServicePublisher,
    ServiceRegistry,
};
use crate::handshake::{HandshakeClient, HandshakeServer};
use crate::reducer::{EffectHandler, EventHandler, Store, StoreContext};

type SyncContext = StoreContext<SyncState, SyncSideEffect>;

/// Forwards one scan into the effect queue
struct ScanForwarder {
    effects: mpsc::UnboundedSender<SyncSideEffect>,
    generation: u64,
}

impl ScanSink for ScanForwarder {
    fn started(&mut self) {
        // Queued ahead of anything the new browse reports
        let _ = self.effects.send(SyncSideEffect::ScanStarted);
    }

    fn event(&mut self, event: DiscoveryEvent) -> bool {
        self.effects
            .send(SyncSideEffect::ServiceDiscovered(event))
            .is_ok()
    }

    fn ended(&mut self) {
        let _ = self.effects.send(SyncSideEffect::ScanEnded(self.generation));
    }
}

/// Event side: starts and stops work
struct SyncEvents {
    publisher: Arc<dyn ServicePublisher>,
    browser: Arc<dyn DiscoveryBackend>,
    service_type: String,
    scanner: Arc<Mutex<Scanner>>,
    /// Bumped on every ScanOn and ScanOff
    scan_generation: Arc<AtomicU64>,
    client: Arc<RwLock<HandshakeClient>>,
}

impl SyncEvents {
    fn publisher_registered(&self) -> bool {
        *self.publisher.subscribe_status().borrow()
    }

    /// Settle the in-flight marker when the publisher will not report a change
    fn settle_registration(&self, ctx: &SyncContext) {
        ctx.send_effect(if self.publisher_registered() {
            SyncSideEffect::RegisterConnected
        } else {
            SyncSideEffect::RegisterDisconnected
        });
    }

    async fn register_on(&self, ctx: &SyncContext) {
        if ctx.state().register_in_progress {
            debug!("Registration already in progress");
            return;
        }

        // Marked before the call so a fast confirmation cannot be overwritten
        ctx.set_state(|s| SyncState {
            register_in_progress: true,
            ..s.clone()
        });
        let already_registered = self.publisher_registered();
        match self.publisher.register().await {
            // No status change is coming
            Ok(()) if already_registered => self.settle_registration(ctx),
            Ok(()) => {}
            Err(e) => {
                error!("Failed to register service: {}", e);
                self.settle_registration(ctx);
            }
        }
    }

    async fn register_off(&self, ctx: &SyncContext) {
        if !ctx.state().registered {
            debug!("Not registered, ignoring unregister");
            return;
        }

        ctx.set_state(|s| SyncState {
            register_in_progress: true,
            ..s.clone()
        });
        let already_unregistered = !self.publisher_registered();
        match self.publisher.unregister().await {
            Ok(()) if already_unregistered => self.settle_registration(ctx),
            Ok(()) => {}
            Err(e) => {
                error!("Failed to unregister service: {}", e);
                self.settle_registration(ctx);
            }
        }
    }

    async fn scan_on(&self, ctx: &SyncContext) {
        if ctx.state().is_scanning {
            debug!("Already scanning");
            return;
        }

        // Set first so an end reported by a short-lived browse lands after it
        ctx.set_state(|s| SyncState {
            is_scanning: true,
            ..s.clone()
        });

        let forwarder = ScanForwarder {
            effects: ctx.effect_sender(),
            generation: self.scan_generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let started = self
            .scanner
            .lock()
            .await
            .start(self.browser.clone(), &self.service_type, forwarder)
            .await;

        if let Err(e) = started {
            error!(service_type = %self.service_type, "Failed to start scan: {}", e);
            ctx.set_state(|s| SyncState {
                is_scanning: false,
                ..s.clone()
            });
        }
    }

    async fn scan_off(&self, ctx: &SyncContext) {
        // An end already queued by the stopped scan is now stale
        self.scan_generation.fetch_add(1, Ordering::SeqCst);
        self.scanner.lock().await.stop();
        ctx.set_state(|s| SyncState {
            is_scanning: false,
            ..s.clone()
        });
    }

    async fn hand_shake(&self, target: &DiscoveredService, ctx: &SyncContext) {
        info!(peer = %target.display_name(), "Sending handshake");
        let response = self.client.read().await.head_shake(target).await;
        ctx.send_effect(SyncSideEffect::HandShakeResponse(response));
    }
}

#[async_trait]
impl EventHandler<SyncState, SyncEvent, SyncSideEffect> for SyncEvents {
    async fn handle_event(&mut self, event: SyncEvent, ctx: &SyncContext) {
        info!(?event, "Sync event");
        match event {
            SyncEvent::TabSelected(tab) => ctx.set_state(|s| SyncState {
                selected_tab: tab,
                ..s.clone()
            }),
            SyncEvent::RegisterOn => self.register_on(ctx).await,
            SyncEvent::RegisterOff => self.register_off(ctx).await,
            SyncEvent::ScanOn => self.scan_on(ctx).await,
            SyncEvent::ScanOff => self.scan_off(ctx).await,
            SyncEvent::HandShake(target) => self.hand_shake(&target, ctx).await,
        }
    }
}

/// Effect side: the only writer of the registry
struct SyncEffects {
    registry: ServiceRegistry,
    browser: Arc<dyn DiscoveryBackend>,
    scan_generation: Arc<AtomicU64>,
}

impl SyncEffects {
    fn publish_services(&self, ctx: &SyncContext) {
        let services = self.registry.services();
        ctx.set_state(|s| SyncState {
            scanned_services: services,
            ..s.clone()
        });
    }

    fn on_service_discovered(&mut self, event: DiscoveryEvent, ctx: &SyncContext) {
        match event {
            DiscoveryEvent::Discovered(stub) => {
                let browser = self.browser.clone();
                tokio::spawn(async move {
                    if let Err(e) = browser.resolve(&stub).await {
                        warn!(key = %stub.key, "Failed to resolve service: {}", e);
                    }
                });
            }
            DiscoveryEvent::Resolved(ref service) => {
                info!(key = %service.key, addresses = ?service.addresses, "Service resolved");
                self.registry.apply(&event);
            }
            DiscoveryEvent::Removed(ref key) => {
                if self.registry.apply(&event) {
                    info!(key = %key, "Service removed");
                }
            }
        }
        self.publish_services(ctx);
    }
}

#[async_trait]
impl EffectHandler<SyncState, SyncSideEffect> for SyncEffects {
    async fn handle_effect(&mut self, effect: SyncSideEffect, ctx: &SyncContext) {
        match effect {
            SyncSideEffect::RegisterConnected => ctx.set_state(|s| SyncState {
                registered: true,
                register_in_progress: false,
                ..s.clone()
            }),
            SyncSideEffect::RegisterDisconnected => ctx.set_state(|s| SyncState {
                registered: false,
                register_in_progress: false,
                ..s.clone()
            }),
            SyncSideEffect::ScanStarted => {
                self.registry.clear();
                self.publish_services(ctx);
            }
            SyncSideEffect::ServiceDiscovered(event) => self.on_service_discovered(event, ctx),
            SyncSideEffect::ScanEnded(generation) => {
                if generation == self.scan_generation.load(Ordering::SeqCst) {
                    warn!("Browse stream ended, scan stopped");
                    ctx.set_state(|s| SyncState {
                        is_scanning: false,
                        ..s.clone()
                    });
                }
            }
            SyncSideEffect::HandShakeResponse(response) => {
                // Delivered to observers through the effect broadcast
                debug!("Handshake response: {}", response);
            }
        }
    }
}

/// Orchestrates advertising, scanning and handshakes
pub struct SyncEngine {
    store: Store<SyncState, SyncEvent, SyncSideEffect>,
    scanner: Arc<Mutex<Scanner>>,
    client: Arc<RwLock<HandshakeClient>>,
    server: HandshakeServer,
}

impl SyncEngine {
    /// Start the orchestrator and the handshake client and server
    pub async fn start(ctx: &AppContext) -> Result<Self> {
        info!("Starting sync engine");
        let config = &ctx.config;

        let mut server = HandshakeServer::new(config.handshake.bind_addr, config.handshake.port);
        server.start().await?;

        let mut client = HandshakeClient::new();
        client.start();
        let client = Arc::new(RwLock::new(client));
        let scanner = Arc::new(Mutex::new(Scanner::new()));
        let scan_generation = Arc::new(AtomicU64::new(0));

        let events = SyncEvents {
            publisher: ctx.publisher.clone(),
            browser: ctx.browser.clone(),
            service_type: config.service.service_type.clone(),
            scanner: scanner.clone(),
            scan_generation: scan_generation.clone(),
            client: client.clone(),
        };
        let effects = SyncEffects {
            registry: ServiceRegistry::new(),
            browser: ctx.browser.clone(),
            scan_generation,
        };

        let mut store = Store::spawn(SyncState::default(), events, effects, config.debounce());
        let status_task = Self::spawn_status_listener(
            ctx.publisher.subscribe_status(),
            store.context().clone(),
        );
        store.attach(status_task);

        Ok(Self {
            store,
            scanner,
            client,
            server,
        })
    }

    /// Turn registration status changes into effects.
    ///
    /// The initial state already says "not registered", so an initial
    /// `false` is not reported; every later value is.
    fn spawn_status_listener(
        mut status: watch::Receiver<bool>,
        ctx: SyncContext,
    ) -> tokio::task::JoinHandle<()> {
        if *status.borrow_and_update() {
            ctx.send_effect(SyncSideEffect::RegisterConnected);
        }

        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let registered = *status.borrow_and_update();
                ctx.send_effect(if registered {
                    SyncSideEffect::RegisterConnected
                } else {
                    SyncSideEffect::RegisterDisconnected
                });
            }
            debug!("Registration status stream closed");
        })
    }

    /// Submit an event; returns immediately
    pub fn send(&self, event: SyncEvent) {
        self.store.submit(event);
    }

    /// Subscribe to state snapshots, starting with the latest
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.store.state()
    }

    pub fn current_state(&self) -> SyncState {
        self.store.current()
    }

    /// Subscribe to side effects as they are processed
    pub fn effects(&self) -> broadcast::Receiver<SyncSideEffect> {
        self.store.effects()
    }

    /// Address the handshake server is bound to
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr().ok()
    }

    /// Cancel the scan, stop every loop, then the client and server
    pub async fn shutdown(&mut self) {
        info!("Stopping sync engine");
        self.scanner.lock().await.stop();
        self.store.shutdown();
        self.client.write().await.stop();
        self.server.stop().await;
    }
}
