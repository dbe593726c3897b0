//! HTTP side that greets a discovered peer

use crate::discovery::DiscoveredService;
use crate::handshake::{HELLO_PATH, NO_ADDRESS_MESSAGE, REQUEST_FAILED_MESSAGE};
use anyhow::{anyhow, Result};

/// Sends the liveness request to a peer.
///
/// Every failure is folded into a fixed message; nothing is returned as an
/// error.
#[derive(Default)]
pub struct HandshakeClient {
    client: Option<reqwest::Client>,
}

impl HandshakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the HTTP transport, replacing any existing one
    pub fn start(&mut self) {
        if self.client.is_some() {
            self.stop();
        }
        self.client = Some(reqwest::Client::new());
    }

    /// Drop the HTTP transport
    pub fn stop(&mut self) {
        self.client = None;
    }

    pub fn is_started(&self) -> bool {
        self.client.is_some()
    }

    /// Greet `target` and return whatever it answered
    pub async fn head_shake(&self, target: &DiscoveredService) -> String {
        let Some(addr) = target.first_socket_addr() else {
            tracing::error!(key = %target.key, "Service has no address");
            return NO_ADDRESS_MESSAGE.to_string();
        };
        let url = format!("http://{}{}", addr, HELLO_PATH);

        match self.get_text(&url).await {
            Ok(body) => {
                tracing::info!(%url, "Response: {}", body);
                body
            }
            Err(e) => {
                tracing::info!(%url, "Request failed: {}", e);
                REQUEST_FAILED_MESSAGE.to_string()
            }
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("handshake client is not started"))?;
        let body = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}
