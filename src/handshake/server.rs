//! HTTP side that answers liveness requests from peers

use crate::handshake::{HELLO_BODY, HELLO_PATH};
use anyhow::{anyhow, Context, Result};
use axum::routing::get;
use axum::Router;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Serves `GET /hello` in the background
pub struct HandshakeServer {
    bind_addr: IpAddr,
    port: u16,
    running: Option<RunningServer>,
}

impl HandshakeServer {
    /// Create a server for `bind_addr:port`; port 0 picks a free port
    pub fn new(bind_addr: IpAddr, port: u16) -> Self {
        Self {
            bind_addr,
            port,
            running: None,
        }
    }

    fn router() -> Router {
        Router::new().route(HELLO_PATH, get(handle_hello))
    }

    /// Bind and start serving without waiting for the server to finish.
    ///
    /// Returns the bound address. Starting a running server restarts it.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.running.is_some() {
            self.stop().await;
        }

        tracing::info!(port = self.port, "About to start handshake server");
        let listener = tokio::net::TcpListener::bind(SocketAddr::new(self.bind_addr, self.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", self.bind_addr, self.port))?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, Self::router()).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!("Handshake server failed: {}", e);
            }
        });

        tracing::info!(%local_addr, "Handshake server listening");
        self.running = Some(RunningServer {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(local_addr)
    }

    /// Stop serving and release the listening socket
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        tracing::info!(local_addr = %running.local_addr, "About to stop handshake server");
        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.task.await {
            if !e.is_cancelled() {
                tracing::warn!("Handshake server task ended abnormally: {}", e);
            }
        }
    }

    /// Address the server is bound to while running
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.running
            .as_ref()
            .map(|running| running.local_addr)
            .ok_or_else(|| anyhow!("handshake server is not running"))
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for HandshakeServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown_tx.send(());
            running.task.abort();
        }
    }
}

async fn handle_hello() -> &'static str {
    tracing::debug!("Handshake request received");
    HELLO_BODY
}
