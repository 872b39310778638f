//! Tool Registry - the immutable name → handler table.
//!
//! This module provides:
//! - A builder that rejects duplicate tool names
//! - Lookup by name for dispatch
//! - Descriptor listing, in registration order, for capability advertisement

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::model::Tool;
use tracing::debug;

use super::definitions::{DownloadImageTool, GenerateImageTool, RemoveBackgroundTool, ScaleImageTool};
use super::error::ToolError;
use super::handlers::{ToolDescriptor, ToolHandler};
use super::pool::WorkerPool;
use crate::core::config::Config;

// ============================================================================
// Tool Registry
// ============================================================================

/// Tool registry - read-only after [`ToolRegistryBuilder::build`].
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Start an empty registry.
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Registry holding the four image tools.
    pub fn with_image_tools(config: &Config, pool: WorkerPool) -> Result<Self, ToolError> {
        let config = Arc::new(config.clone());

        Ok(Self::builder()
            .register(GenerateImageTool::new(config.clone())?)?
            .register(RemoveBackgroundTool::new(config.clone())?)?
            .register(DownloadImageTool::new(config)?)?
            .register(ScaleImageTool::new(pool))?
            .build())
    }

    /// Find the handler registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&Arc<dyn ToolHandler>, ToolError> {
        self.index
            .get(name)
            .map(|&i| &self.handlers[i])
            .ok_or_else(|| ToolError::not_found(name))
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        self.handlers.iter().map(|h| h.descriptor()).collect()
    }

    /// Descriptors as rmcp tool models.
    pub fn tools(&self) -> Vec<Tool> {
        self.handlers.iter().map(|h| h.descriptor().to_tool()).collect()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.descriptor().name).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects handlers before freezing them into a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    handlers: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistryBuilder {
    /// Add a handler. Fails if its name is already taken.
    pub fn register<H>(mut self, handler: H) -> Result<Self, ToolError>
    where
        H: ToolHandler + 'static,
    {
        let name = handler.descriptor().name;
        if self.index.contains_key(name) {
            return Err(ToolError::DuplicateTool(name.to_string()));
        }

        debug!("Registering tool: {}", name);
        self.index.insert(name, self.handlers.len());
        self.handlers.push(Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            handlers: self.handlers,
            index: self.index,
        }
    }
}
