//! Minimal liveness exchange between peers over plain HTTP

pub mod client;
pub mod server;

pub use client::HandshakeClient;
pub use server::HandshakeServer;

/// Path answered by the handshake server
pub const HELLO_PATH: &str = "/hello";

/// Body of a successful handshake
pub const HELLO_BODY: &str = "Hello!";

/// Returned when the target has no address to connect to
pub const NO_ADDRESS_MESSAGE: &str = "No message, address is not supported";

/// Returned when the request could not be completed
pub const REQUEST_FAILED_MESSAGE: &str = "Request failed";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveredService;
    use std::net::{IpAddr, Ipv4Addr};

    fn target(port: u16) -> DiscoveredService {
        let mut service = DiscoveredService::stub("local._http._tcp.local.", "local");
        service.port = port;
        service.addresses = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
        service
    }

    #[tokio::test]
    async fn test_head_shake_without_address() {
        let mut client = HandshakeClient::new();
        client.start();

        let stub = DiscoveredService::stub("k", "n");
        assert_eq!(client.head_shake(&stub).await, NO_ADDRESS_MESSAGE);
    }

    #[tokio::test]
    async fn test_head_shake_against_server() {
        let mut server = HandshakeServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let addr = server.start().await.unwrap();

        let mut client = HandshakeClient::new();
        client.start();
        assert_eq!(client.head_shake(&target(addr.port())).await, "Hello!");

        server.stop().await;
        client.stop();
    }

    #[tokio::test]
    async fn test_head_shake_connection_refused() {
        // Bind and release to get a port nobody listens on
        let mut server = HandshakeServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let addr = server.start().await.unwrap();
        server.stop().await;

        let mut client = HandshakeClient::new();
        client.start();
        assert_eq!(
            client.head_shake(&target(addr.port())).await,
            REQUEST_FAILED_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_head_shake_unknown_path_fails() {
        let mut server = HandshakeServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let addr = server.start().await.unwrap();

        let response = reqwest::get(format!("http://{}/other", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_head_shake_before_start() {
        let mut server = HandshakeServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let addr = server.start().await.unwrap();

        let client = HandshakeClient::new();
        assert_eq!(
            client.head_shake(&target(addr.port())).await,
            REQUEST_FAILED_MESSAGE
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn test_server_restart_and_stop() {
        let mut server = HandshakeServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        assert!(server.local_addr().is_err());

        server.start().await.unwrap();
        let second = server.start().await.unwrap();
        assert_eq!(server.local_addr().unwrap(), second);

        server.stop().await;
        assert!(!server.is_running());
        server.stop().await;
    }
}
