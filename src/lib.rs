//! Image MCP Server Library
//!
//! A Model Context Protocol (MCP) server exposing four image tools:
//! `generate_image`, `remove_background`, `download_image` and `scale_image`.
//!
//! # Architecture
//!
//! The server is organized into the following modules:
//!
//! - **core**: Core infrastructure including configuration, error handling,
//!   lifecycle, transports and the main server
//! - **domains**: Business logic organized by bounded contexts
//!   - **tools**: The tool registry, dispatcher and the image tools
//!
//! # Example
//!
//! ```rust,no_run
//! use image_mcp_server::core::{Config, McpServer, TransportService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = McpServer::new(config.clone())?;
//!     TransportService::new(config.transport, config.shutdown.grace_period())
//!         .run(server)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};
