//! Integration tests for mDNS discovery.
//!
//! These talk to the real network stack, so they only run with
//! `--features integration-tests`.

#![cfg(feature = "integration-tests")]

use lansync::discovery::types::default_txt;
use lansync::discovery::{
    AdvertisedService, DiscoveryBackend, DiscoveryEvent, MdnsAdvertiser, MdnsBrowser, MdnsDaemon,
    ServicePublisher,
};
use std::time::Duration;
use tokio::time::timeout;

fn test_service(port: u16) -> AdvertisedService {
    AdvertisedService {
        service_type: "_lansynctest._tcp".to_string(),
        instance_name: format!("lansync-test-{}", uuid::Uuid::new_v4().simple()),
        port,
        txt: default_txt(),
    }
}

/// Test that a registered service is seen by a browse on the same host
#[tokio::test]
async fn test_advertise_and_browse() {
    let daemon = MdnsDaemon::new().unwrap();
    let service = test_service(47001);
    let advertiser = MdnsAdvertiser::new(daemon.clone(), service.clone());
    let browser = MdnsBrowser::new(daemon.clone());

    let mut status = advertiser.subscribe_status();
    advertiser.register().await.unwrap();
    assert!(*status.borrow_and_update());

    let mut events = browser.browse(&service.service_type).await.unwrap();
    let found = timeout(Duration::from_secs(10), async {
        while let Some(event) = events.recv().await {
            if let DiscoveryEvent::Resolved(found) = event {
                if found.name == service.instance_name {
                    return Some(found);
                }
            }
        }
        None
    })
    .await
    .expect("Timeout waiting for our own announcement")
    .expect("Browse ended early");

    assert_eq!(found.port, 47001);
    assert!(!found.addresses.is_empty());
    assert_eq!(found.txt_value("key1").as_deref(), Some("value1"));

    advertiser.unregister().await.unwrap();
    assert!(!*status.borrow_and_update());

    drop(events);
    daemon.shutdown().unwrap();
}

/// Test that registering twice is harmless
#[tokio::test]
async fn test_register_is_idempotent() {
    let daemon = MdnsDaemon::new().unwrap();
    let advertiser = MdnsAdvertiser::new(daemon.clone(), test_service(47002));

    advertiser.register().await.unwrap();
    advertiser.register().await.unwrap();
    assert!(*advertiser.subscribe_status().borrow());

    advertiser.unregister().await.unwrap();
    daemon.shutdown().unwrap();
}

/// Test that a repeated RegisterOn against the real advertiser settles
#[tokio::test]
async fn test_engine_register_on_twice_settles() {
    use lansync::{AppContext, Config, SyncEngine, SyncEvent};
    use std::net::{IpAddr, Ipv4Addr};

    let mut config = Config::default();
    config.service.service_type = "_lansynctest._tcp".to_string();
    config.sync.debounce_ms = 0;
    config.handshake.bind_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.handshake.port = 0;

    let ctx = AppContext::mdns(config).unwrap();
    let mut engine = SyncEngine::start(&ctx).await.unwrap();
    let mut state = engine.state();

    engine.send(SyncEvent::RegisterOn);
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.registered && !s.register_in_progress),
    )
    .await
    .expect("Timeout waiting for registration")
    .unwrap();

    engine.send(SyncEvent::RegisterOn);
    engine.send(SyncEvent::TabSelected(1));
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.selected_tab == 1 && !s.register_in_progress),
    )
    .await
    .expect("Registration stayed in progress")
    .unwrap();
    assert!(engine.current_state().registered);

    engine.shutdown().await;
    ctx.publisher.unregister().await.unwrap();
    ctx.shutdown();
}
