//! Error types and handling for the MCP server.
//!
//! This module defines a unified error type over the tools domain, startup
//! configuration and the transport layer.

use thiserror::Error;

/// A specialized Result type for MCP server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the MCP server.
///
/// Wraps the error of each layer: tool registration, startup configuration
/// and the transport.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the tools domain.
    #[error("Tool error: {0}")]
    Tool(#[from] crate::domains::tools::ToolError),

    /// Startup configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error raised by the transport layer.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),
}

/// Errors raised while loading configuration at startup.
///
/// These are fatal: the binary exits with status 1 before binding any socket.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the primary nor the fallback credential variable is set.
    #[error("Neither {primary} nor {fallback} environment variables are set")]
    MissingCredential {
        primary: &'static str,
        fallback: &'static str,
    },

    /// An environment variable has a value that cannot be parsed.
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl ConfigError {
    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
