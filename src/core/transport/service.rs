//! Transport service - orchestrates different transport types.
//!
//! This service provides a unified interface for starting the MCP server
//! with different transport mechanisms, and owns the shutdown sequence:
//! a termination signal moves the lifecycle to `ShuttingDown`, the transport
//! stops accepting work, and in-flight operations get the grace period to
//! settle.

use std::time::Duration;

use tracing::info;

use super::{TransportConfig, TransportResult};
use crate::core::McpServer;
use crate::core::lifecycle::{ShutdownOutcome, wait_for_shutdown_signal};

#[cfg(feature = "stdio")]
use super::stdio::StdioTransport;

#[cfg(feature = "http")]
use super::http::HttpTransport;

/// Transport service - manages the transport layer for the MCP server.
pub struct TransportService {
    config: TransportConfig,
    shutdown_grace: Duration,
}

impl TransportService {
    /// Create a new transport service with the given configuration.
    pub fn new(config: TransportConfig, shutdown_grace: Duration) -> Self {
        Self {
            config,
            shutdown_grace,
        }
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Log information about the configured transport.
    pub fn log_info(&self) {
        info!("Starting transport: {}", self.config.description());
    }

    /// Serve until a termination signal (or the peer closing STDIO), then
    /// drain in-flight work.
    pub async fn run(self, server: McpServer) -> TransportResult<ShutdownOutcome> {
        self.log_info();

        let lifecycle = server.lifecycle().clone();
        let signal_lifecycle = lifecycle.clone();
        let signals = tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            signal_lifecycle.begin_shutdown();
        });

        let served = self.serve(server).await;
        signals.abort();
        served?;

        Ok(lifecycle.drain(self.shutdown_grace).await)
    }

    async fn serve(&self, server: McpServer) -> TransportResult<()> {
        match &self.config {
            #[cfg(feature = "stdio")]
            TransportConfig::Stdio => StdioTransport::run(server).await,
            #[cfg(feature = "http")]
            TransportConfig::Http(cfg) => {
                HttpTransport::new(cfg.clone(), self.shutdown_grace)
                    .run(server)
                    .await
            }
        }
    }
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::lifecycle::ServerState;

    #[tokio::test]
    async fn test_shutdown_request_stops_http_transport() {
        let server = McpServer::new(Config::default()).unwrap();
        let lifecycle = server.lifecycle().clone();
        let service = TransportService::new(
            TransportConfig::http(0, "127.0.0.1"),
            Duration::from_millis(200),
        );

        let handle = tokio::spawn(service.run(server));

        let mut states = lifecycle.subscribe();
        while *states.borrow_and_update() != ServerState::Serving {
            states.changed().await.unwrap();
        }

        lifecycle.begin_shutdown();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(lifecycle.state(), ServerState::Stopped);
    }
}
