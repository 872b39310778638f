//! STDIO transport implementation.
//!
//! Newline-delimited JSON-RPC over stdin/stdout, served by rmcp through the
//! [`rmcp::ServerHandler`] implementation of [`McpServer`].

use rmcp::ServiceExt;
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::McpServer;

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Run the STDIO transport until the peer closes it or shutdown is requested.
    pub async fn run(server: McpServer) -> TransportResult<()> {
        let lifecycle = server.lifecycle().clone();

        let service = server
            .serve(rmcp::transport::stdio())
            .await
            .map_err(|e| TransportError::init(e.to_string()))?;

        info!("Ready - communicating via stdin/stdout");
        lifecycle.mark_serving();

        let cancel = service.cancellation_token();
        let shutdown = lifecycle.shutdown_requested();
        tokio::spawn(async move {
            shutdown.await;
            cancel.cancel();
        });

        service
            .waiting()
            .await
            .map_err(|e| TransportError::ServiceError(e.to_string()))?;

        info!("STDIO transport finished");
        Ok(())
    }
}
