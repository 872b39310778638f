//! Dispatcher - routes a named invocation to its handler.
//!
//! One pass per call: lookup, schema validation with default filling, then the
//! handler runs inside the lifecycle's in-flight tracker. Operation failures are
//! flattened into an error-flagged text output here and nowhere else.

use std::sync::Arc;

use rmcp::model::Tool;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::error::{HandlerError, ToolError};
use super::handlers::{ToolDescriptor, ToolOutput};
use super::registry::ToolRegistry;
use super::schema::validate_arguments;
use crate::core::lifecycle::Lifecycle;

/// Cloneable handle shared by every transport.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    lifecycle: Lifecycle,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, lifecycle: Lifecycle) -> Self {
        Self {
            registry,
            lifecycle,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Descriptors for capability listing.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.registry.list()
    }

    /// Descriptors as rmcp tool models.
    pub fn tools(&self) -> Vec<Tool> {
        self.registry.tools()
    }

    /// Invoke `name` with `arguments`.
    ///
    /// `Err` only for protocol-level failures: unknown tool, rejected
    /// arguments, or cancellation by shutdown. A failing operation is an
    /// `Ok` output with `is_error` set.
    #[instrument(skip(self, arguments), fields(tool = %name))]
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        let handler = self.registry.lookup(name).inspect_err(|_| {
            warn!("Unknown tool requested: {}", name);
        })?;

        let arguments = validate_arguments(&handler.descriptor().input_schema, arguments)
            .inspect_err(|e| warn!("Rejected arguments for {}: {}", name, e))?;

        info!("Calling tool: {}", name);
        let outcome = self
            .lifecycle
            .run(handler.call(arguments))
            .await
            .ok_or(ToolError::Cancelled)?;

        match outcome {
            Ok(result) => {
                info!("Tool {} succeeded", name);
                Ok(ToolOutput::success(result))
            }
            Err(HandlerError::Rejected(e)) => {
                warn!("Tool {} rejected its arguments: {}", name, e);
                Err(e)
            }
            Err(HandlerError::Failed(e)) => {
                warn!("Tool {} failed: {}", name, e);
                Ok(ToolOutput::failure(e))
            }
        }
    }
}
