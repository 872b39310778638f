//! HTTP transport implementation.
//!
//! Two ways to talk JSON-RPC over HTTP:
//! - `POST /mcp`: request/response, the reply is the HTTP body.
//! - `GET /sse` + `POST /messages/?session_id=…`: the legacy MCP SSE
//!   transport. Posts are acknowledged with `202 Accepted` and the reply is
//!   pushed onto the session's event stream.

use std::future::IntoFuture;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::sse::{SessionRegistry, endpoint_for};
use super::{HttpConfig, TransportError, TransportResult};
use crate::core::McpServer;
use crate::domains::tools::ToolError;

/// MCP protocol revision announced on `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
    shutdown_grace: Duration,
}

/// JSON-RPC request structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Notifications carry no id and expect no reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.starts_with("notifications/")
    }
}

/// JSON-RPC response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Method not found error.
    pub fn method_not_found(id: Option<serde_json::Value>) -> Self {
        Self::error(id, -32601, "Method not found")
    }

    /// Invalid request error.
    pub fn invalid_request(id: Option<serde_json::Value>) -> Self {
        Self::error(id, -32600, "Invalid Request")
    }

    /// Invalid params error.
    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, -32602, msg)
    }

    /// Internal error.
    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, -32603, msg)
    }
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The MCP server instance.
    server: McpServer,
    /// Open SSE sessions.
    sessions: SessionRegistry,
    /// Where SSE clients post their requests.
    messages_path: String,
}

/// Query of `POST /messages/`.
#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Uuid,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig, shutdown_grace: Duration) -> Self {
        Self {
            config,
            shutdown_grace,
        }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Run the HTTP transport until shutdown is requested.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        let addr = self.address();
        let lifecycle = server.lifecycle().clone();
        let app = router(server, &self.config);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;
        let local_addr = listener.local_addr().map_err(TransportError::IoError)?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!(
            "Ready - listening on {} (JSON-RPC over HTTP + SSE, CORS {})",
            local_addr, cors_status
        );
        info!("  → JSON-RPC: POST {}", self.config.rpc_path);
        info!("  → SSE:      GET  {}", self.config.sse_path);
        info!("  → Messages: POST {}?session_id=…", self.config.messages_path);
        info!("  → Health:   GET  /health");
        lifecycle.mark_serving();

        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(lifecycle.shutdown_requested())
            .into_future();
        let grace = self.shutdown_grace;
        let deadline = async move {
            lifecycle.shutdown_requested().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = serve => result.map_err(|e| TransportError::http(e.to_string()))?,
            _ = deadline => warn!("Open connections did not close within {:?}", grace),
        }

        Ok(())
    }
}

/// Build the axum router for `server`.
pub fn router(server: McpServer, config: &HttpConfig) -> Router {
    let state = AppState {
        server,
        sessions: SessionRegistry::new(),
        messages_path: config.messages_path.clone(),
    };

    let app = Router::new()
        .route(&config.rpc_path, post(handle_rpc))
        .route(&config.sse_path, get(handle_sse))
        .route(&config.messages_path, post(handle_message))
        .route("/health", get(health_check))
        .route("/", get(root_handler))
        .with_state(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app.layer(cors)
    } else {
        app
    }
}

/// Root handler - provides API info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": state.server.name(),
        "version": state.server.version(),
        "transport": "HTTP + SSE",
        "endpoints": {
            "rpc": "/mcp",
            "sse": "/sse",
            "messages": state.messages_path,
            "health": "/health"
        },
        "protocol": "JSON-RPC 2.0",
        "documentation": "POST JSON-RPC messages to /mcp, or open /sse and post to the announced endpoint"
    }))
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "in_flight": state.server.lifecycle().in_flight(),
        "sse_sessions": state.sessions.len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Handle JSON-RPC requests.
#[instrument(skip_all, fields(method))]
async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    tracing::Span::current().record("method", request.method.as_str());
    info!("Received JSON-RPC request: {}", request.method);

    let response = process_request(&state, request).await;

    (StatusCode::OK, Json(response))
}

/// Open an SSE session.
async fn handle_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (id, rx, guard) = state.sessions.open();
    let endpoint = endpoint_for(&state.messages_path, &id);
    info!(session_id = %id, "SSE client connected");

    let first = stream::once(async move {
        Ok::<_, axum::Error>(Event::default().event("endpoint").data(endpoint))
    });

    // The guard rides along with the receiver so the session closes with the stream
    let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let response = rx.recv().await?;
        let event = Event::default().event("message").json_data(&response);
        Some((event, (rx, guard)))
    });

    let events = first
        .chain(messages)
        .take_until(state.server.lifecycle().shutdown_requested());

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Accept a request for an SSE session; the reply goes out on its stream.
#[instrument(skip_all, fields(session_id = %query.session_id, method))]
async fn handle_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    tracing::Span::current().record("method", request.method.as_str());

    if !state.sessions.contains(&query.session_id) {
        warn!("Unknown SSE session");
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    }
    info!("Received JSON-RPC message: {}", request.method);

    let session_id = query.session_id;
    tokio::spawn(async move {
        let notification = request.is_notification();
        let response = process_request(&state, request).await;
        if !notification {
            state.sessions.send(&session_id, response).await;
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Process a JSON-RPC request and return the response.
async fn process_request(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    // Validate JSON-RPC version
    if request.jsonrpc != "2.0" {
        return JsonRpcResponse::invalid_request(request.id);
    }

    match request.method.as_str() {
        // Initialize the MCP session
        "initialize" => handle_initialize(state, request),

        // Liveness probe
        "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),

        // List available tools
        "tools/list" => handle_tools_list(state, request),

        // Call a tool
        "tools/call" => handle_tools_call(state, request).await,

        // No resources or prompts are offered
        "resources/list" => {
            JsonRpcResponse::success(request.id, serde_json::json!({ "resources": [] }))
        }
        "resources/templates/list" => JsonRpcResponse::success(
            request.id,
            serde_json::json!({ "resourceTemplates": [] }),
        ),
        "prompts/list" => {
            JsonRpcResponse::success(request.id, serde_json::json!({ "prompts": [] }))
        }

        // Notifications (no response needed for stateless HTTP)
        method if method.starts_with("notifications/") => {
            info!("Received notification: {}", method);
            JsonRpcResponse::success(request.id, serde_json::json!(null))
        }

        // Unknown method
        _ => {
            warn!("Unknown method: {}", request.method);
            JsonRpcResponse::method_not_found(request.id)
        }
    }
}

/// Handle initialize request.
fn handle_initialize(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    info!("Processing initialize request");

    let result = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {},
            "resources": {},
            "prompts": {}
        },
        "serverInfo": {
            "name": state.server.name(),
            "version": state.server.version()
        },
        "instructions": state.server.instructions()
    });

    JsonRpcResponse::success(request.id, result)
}

/// Handle tools/list request.
fn handle_tools_list(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    info!("Processing tools/list request");

    let tools = state.server.list_tools();
    let result = serde_json::json!({
        "tools": tools
    });

    JsonRpcResponse::success(request.id, result)
}

/// Handle tools/call request.
async fn handle_tools_call(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    info!("Processing tools/call request");

    let params = match request.params {
        Some(p) => p,
        None => return JsonRpcResponse::invalid_params(request.id.clone(), "Missing params"),
    };

    let name = match params.get("name").and_then(|v| v.as_str()) {
        Some(n) => n.to_string(),
        None => return JsonRpcResponse::invalid_params(request.id.clone(), "Missing tool name"),
    };

    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or(serde_json::json!({}));

    match state.server.call_tool(&name, arguments).await {
        Ok(output) => JsonRpcResponse::success(request.id, output.to_json()),
        Err(e @ (ToolError::NotFound(_) | ToolError::InvalidArguments(_))) => {
            JsonRpcResponse::invalid_params(request.id, e.to_string())
        }
        Err(e) => JsonRpcResponse::internal_error(request.id, e.to_string()),
    }
}
