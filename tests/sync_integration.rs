//! End-to-end orchestrator tests over the in-memory discovery substrate
//! and a real handshake server standing in for a peer.

use lansync::discovery::{DiscoveredService, DiscoveryEvent, MemoryBrowser, MemoryPublisher};
use lansync::handshake::{HandshakeServer, REQUEST_FAILED_MESSAGE};
use lansync::{AppContext, Config, SyncEngine, SyncEvent, SyncSideEffect, SyncState};
use pretty_assertions::assert_eq;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn local_config() -> Config {
    let mut config = Config::default();
    config.sync.debounce_ms = 0;
    config.handshake.bind_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.handshake.port = 0;
    config
}

fn peer(name: &str, port: u16) -> DiscoveredService {
    let mut service = DiscoveredService::stub(format!("{}._http._tcp.local.", name), name);
    service.host = format!("{}.local.", name);
    service.port = port;
    service.addresses = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
    service
}

async fn wait_for(engine: &SyncEngine, predicate: impl FnMut(&SyncState) -> bool) -> SyncState {
    let mut state = engine.state();
    let snapshot = timeout(Duration::from_secs(2), state.wait_for(predicate))
        .await
        .expect("Timeout waiting for state")
        .expect("State channel closed")
        .clone();
    snapshot
}

async fn next_handshake(engine: &SyncEngine, event: SyncEvent) -> String {
    let mut effects = engine.effects();
    engine.send(event);
    timeout(Duration::from_secs(5), async {
        loop {
            match effects.recv().await {
                Ok(SyncSideEffect::HandShakeResponse(body)) => return body,
                Ok(_) => continue,
                Err(e) => panic!("Effect stream ended: {}", e),
            }
        }
    })
    .await
    .expect("Timeout waiting for handshake response")
}

#[tokio::test]
async fn test_discover_then_greet_peer() {
    let mut remote = HandshakeServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let remote_addr = remote.start().await.unwrap();

    let browser = MemoryBrowser::new();
    let publisher = Arc::new(MemoryPublisher::new());
    let ctx = AppContext::new(local_config(), Arc::new(browser.clone()), publisher.clone());
    let mut engine = SyncEngine::start(&ctx).await.unwrap();

    engine.send(SyncEvent::RegisterOn);
    wait_for(&engine, |s| s.registered).await;

    engine.send(SyncEvent::ScanOn);
    wait_for(&engine, |s| s.is_scanning).await;

    let remote_peer = peer("desk", remote_addr.port());
    browser.add_resolvable(remote_peer.clone());
    assert!(
        browser
            .emit(DiscoveryEvent::Discovered(DiscoveredService::stub(
                remote_peer.key.clone(),
                "desk"
            )))
            .await
    );

    let state = wait_for(&engine, |s| !s.scanned_services.is_empty()).await;
    assert_eq!(state.scanned_services, vec![remote_peer.clone()]);

    let response = next_handshake(&engine, SyncEvent::HandShake(remote_peer.clone())).await;
    assert_eq!(response, "Hello!");

    // Peer goes away: listed until removed, unreachable afterwards
    remote.stop().await;
    let response = next_handshake(&engine, SyncEvent::HandShake(remote_peer.clone())).await;
    assert_eq!(response, REQUEST_FAILED_MESSAGE);

    browser
        .emit(DiscoveryEvent::Removed(remote_peer.key.clone()))
        .await;
    wait_for(&engine, |s| s.scanned_services.is_empty()).await;

    engine.shutdown().await;
}

#[tokio::test]
async fn test_several_peers_listed_once_each() {
    let browser = MemoryBrowser::new();
    let ctx = AppContext::new(
        local_config(),
        Arc::new(browser.clone()),
        Arc::new(MemoryPublisher::new()),
    );
    let mut engine = SyncEngine::start(&ctx).await.unwrap();

    engine.send(SyncEvent::ScanOn);
    wait_for(&engine, |s| s.is_scanning).await;

    for (name, port) in [("b", 9002), ("a", 9001), ("b", 9003), ("c", 9004)] {
        browser
            .emit(DiscoveryEvent::Resolved(peer(name, port)))
            .await;
    }

    let state = wait_for(&engine, |s| {
        s.scanned_services.len() == 3
            && s.scanned_services.iter().any(|p| p.name == "b" && p.port == 9003)
    })
    .await;
    let names: Vec<String> = state
        .sorted_services()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_two_engines_on_one_process() {
    let ctx_a = AppContext::new(
        local_config(),
        Arc::new(MemoryBrowser::new()),
        Arc::new(MemoryPublisher::new()),
    );
    let ctx_b = AppContext::new(
        local_config(),
        Arc::new(MemoryBrowser::new()),
        Arc::new(MemoryPublisher::new()),
    );
    let mut a = SyncEngine::start(&ctx_a).await.unwrap();
    let mut b = SyncEngine::start(&ctx_b).await.unwrap();

    let b_port = b.server_addr().unwrap().port();
    let response = next_handshake(&a, SyncEvent::HandShake(peer("b", b_port))).await;
    assert_eq!(response, "Hello!");

    let a_port = a.server_addr().unwrap().port();
    let response = next_handshake(&b, SyncEvent::HandShake(peer("a", a_port))).await;
    assert_eq!(response, "Hello!");

    a.shutdown().await;
    b.shutdown().await;
}
