//! MCP Server implementation.
//!
//! [`McpServer`] bundles the configuration, the dispatcher over the immutable
//! tool registry, and the lifecycle handle. Every transport talks to it: the
//! HTTP transport through [`McpServer::list_tools`] and
//! [`McpServer::call_tool`], the STDIO transport through rmcp's
//! [`ServerHandler`].

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::config::Config;
use super::lifecycle::Lifecycle;
use crate::domains::tools::{Dispatcher, ToolError, ToolOutput, ToolRegistry, WorkerPool};

const INSTRUCTIONS: &str = "Image tools: generate_image creates an image from a text prompt, \
remove_background cuts out the subject of an image, download_image saves an image URL \
locally, scale_image writes resized PNG copies of a local image.";

/// The main MCP server handler.
#[derive(Clone)]
pub struct McpServer {
    /// Server configuration.
    config: Arc<Config>,

    /// Routes tool calls to the registered handlers.
    dispatcher: Dispatcher,

    /// Shared lifecycle (state, cancellation, in-flight tracking).
    lifecycle: Lifecycle,
}

impl McpServer {
    /// Create a server exposing the image tools.
    pub fn new(config: Config) -> Result<Self, ToolError> {
        let lifecycle = Lifecycle::new();
        let pool = WorkerPool::with_tracker(
            config.tools.max_blocking_workers,
            lifecycle.tracker().clone(),
        );
        let registry = ToolRegistry::with_image_tools(&config, pool)?;
        Ok(Self::with_registry(config, registry, lifecycle))
    }

    /// Create a server over an explicit registry.
    pub fn with_registry(config: Config, registry: ToolRegistry, lifecycle: Lifecycle) -> Self {
        info!("Registered {} tools: {:?}", registry.len(), registry.names());
        Self {
            config: Arc::new(config),
            dispatcher: Dispatcher::new(Arc::new(registry), lifecycle.clone()),
            lifecycle,
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    pub fn instructions(&self) -> &'static str {
        INSTRUCTIONS
    }

    /// Get the server configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ========================================================================
    // HTTP Transport Support Methods
    // ========================================================================

    /// List all available tools (for HTTP transport).
    pub fn list_tools(&self) -> Vec<serde_json::Value> {
        self.dispatcher
            .list()
            .into_iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema
                })
            })
            .collect()
    }

    /// Call a tool by name (for HTTP transport).
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        self.dispatcher.dispatch(name, arguments).await
    }
}

/// Map dispatch errors onto protocol errors.
fn to_mcp_error(error: ToolError) -> McpError {
    match error {
        ToolError::NotFound(_) | ToolError::InvalidArguments(_) => {
            McpError::invalid_params(error.to_string(), None)
        }
        ToolError::Cancelled | ToolError::DuplicateTool(_) | ToolError::Internal(_) => {
            McpError::internal_error(error.to_string(), None)
        }
    }
}

/// ServerHandler implementation used by the STDIO transport.
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::from_build_env();
        server_info.name = self.name().to_string();
        server_info.version = self.version().to_string();

        ServerInfo {
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info,
            ..Default::default()
        }
    }

    #[instrument(skip(self, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        info!("Listing tools");
        Ok(ListToolsResult {
            tools: self.dispatcher.tools(),
            next_cursor: None,
            meta: None,
        })
    }

    #[instrument(skip(self, request, _context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Null);

        self.dispatcher
            .dispatch(&request.name, arguments)
            .await
            .map(ToolOutput::into_call_result)
            .map_err(to_mcp_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server() -> McpServer {
        McpServer::new(Config::default()).unwrap()
    }

    #[test]
    fn test_server_identity() {
        let server = server();
        assert_eq!(server.name(), "image-gen-server");
        assert_eq!(server.version(), env!("CARGO_PKG_VERSION"));

        let info = server.get_info();
        assert_eq!(info.server_info.name, "image-gen-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_list_tools_json_shape() {
        let tools = server().list_tools();
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[0]["name"], "generate_image");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["prompt"]));
        assert_eq!(tools[3]["name"], "scale_image");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let err = server().call_tool("paint", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        let mcp = to_mcp_error(err);
        assert_eq!(mcp.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_generate_without_key_is_error_text() {
        let output = server()
            .call_tool("generate_image", json!({ "prompt": "a lighthouse" }))
            .await
            .unwrap();
        assert!(output.is_error);
        assert!(output.text().unwrap().starts_with("Error"));
    }
}
