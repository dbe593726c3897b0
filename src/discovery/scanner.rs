//! Background browse task feeding discovery events to a sink

use crate::discovery::{DiscoveryBackend, DiscoveryEvent};
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Receives what a scan reports.
///
/// `started` runs once the browse is open and before the first event;
/// `ended` runs only when the stream finishes on its own, never after
/// [`Scanner::stop`].
pub trait ScanSink: Send + 'static {
    fn started(&mut self) {}

    /// Handle one event; returning false ends the scan
    fn event(&mut self, event: DiscoveryEvent) -> bool;

    fn ended(&mut self) {}
}

impl<F> ScanSink for F
where
    F: FnMut(DiscoveryEvent) -> bool + Send + 'static,
{
    fn event(&mut self, event: DiscoveryEvent) -> bool {
        self(event)
    }
}

/// Owns the task listening on a discovery stream.
///
/// The task only forwards events; it never interprets them. Stopping aborts
/// it, which takes effect at its next await on the stream.
#[derive(Default)]
pub struct Scanner {
    browse_handle: Option<JoinHandle<()>>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start browsing `service_type`, handing every event to `sink`.
    ///
    /// A scan that is already running is stopped first. If the browse
    /// cannot be opened the sink is dropped untouched.
    pub async fn start<S: ScanSink>(
        &mut self,
        backend: Arc<dyn DiscoveryBackend>,
        service_type: &str,
        mut sink: S,
    ) -> Result<()> {
        self.stop();

        let mut receiver = backend.browse(service_type).await?;
        let service_type = service_type.to_string();
        sink.started();

        let handle = tokio::spawn(async move {
            tracing::info!(service_type = %service_type, "Scan started");
            while let Some(event) = receiver.recv().await {
                tracing::debug!(key = event.key(), "Discovery event");
                if !sink.event(event) {
                    tracing::debug!("Discovery sink closed");
                    return;
                }
            }
            tracing::info!(service_type = %service_type, "Scan finished");
            sink.ended();
        });

        self.browse_handle = Some(handle);
        Ok(())
    }

    /// Cancel the running scan, if any
    pub fn stop(&mut self) {
        if let Some(handle) = self.browse_handle.take() {
            handle.abort();
            tracing::info!("Scan cancelled");
        }
    }

    /// Whether a scan task is alive
    pub fn is_running(&self) -> bool {
        self.browse_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}
