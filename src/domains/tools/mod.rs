//! Tools domain module.
//!
//! Tools are executable functions that MCP clients call by name.
//!
//! ## Architecture
//!
//! - `definitions/` - Individual tool implementations (one file per tool)
//! - `schema.rs` - Input schema generation and argument validation
//! - `registry.rs` - Immutable name → handler table
//! - `dispatcher.rs` - Validation, invocation and result wrapping
//! - `pool.rs` - Bounded pool for blocking image work
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `definitions/` with a params struct and a type
//!    implementing [`ToolHandler`]
//! 2. Export it in `definitions/mod.rs`
//! 3. Register it in [`ToolRegistry::with_image_tools`]

pub mod definitions;
mod dispatcher;
mod error;
mod handlers;
pub mod pool;
mod registry;
pub mod schema;

pub use dispatcher::Dispatcher;
pub use error::{HandlerError, OperationError, ToolError};
pub use handlers::{ToolDescriptor, ToolHandler, ToolOutput, ToolResult};
pub use pool::WorkerPool;
pub use registry::{ToolRegistry, ToolRegistryBuilder};
