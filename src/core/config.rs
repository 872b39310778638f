//! Configuration management for the MCP server.
//!
//! This module provides a centralized configuration structure that can be
//! populated from environment variables, a `.env` file, or defaults.

use super::error::ConfigError;
use super::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Primary environment variable holding the image API key.
pub const FAL_KEY_VAR: &str = "FAL_KEY";

/// Fallback environment variable accepted when the primary one is absent.
pub const FAL_KEY_FALLBACK_VAR: &str = "FAL_API_KEY";

/// Main configuration structure for the MCP server.
///
/// This struct contains all configurable aspects of the server, organized
/// by domain for clarity and maintainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// External API credentials configuration.
    pub credentials: CredentialsConfig,

    /// Remote image API settings.
    pub fal: FalConfig,

    /// Tool execution settings.
    pub tools: ToolsConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_timestamps: true,
        }
    }
}

impl LoggingConfig {
    /// Read `MCP_LOG_LEVEL` and `MCP_LOG_TIMESTAMPS` through `lookup`.
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut logging = Self::default();
        if let Some(level) = lookup("MCP_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            logging.level = level.trim().to_string();
        }
        if let Some(flag) = lookup("MCP_LOG_TIMESTAMPS") {
            let flag = flag.trim().to_lowercase();
            logging.with_timestamps = flag != "false" && flag != "0";
        }
        logging
    }

    /// Logging settings from the process environment.
    ///
    /// Read on its own so logging can start before the rest of the config loads.
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }
}

/// Configuration for external API credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// API key for the fal.ai image endpoints.
    pub fal_key: Option<String>,
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("fal_key", &self.fal_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Where the resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Found under `FAL_KEY`.
    Primary,
    /// Found under `FAL_API_KEY` only.
    Fallback,
}

impl CredentialsConfig {
    /// Resolve the API key through `lookup`, trying the primary name first.
    ///
    /// Empty values count as absent.
    pub fn resolve<F>(lookup: F) -> Result<(Self, CredentialSource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = lookup(FAL_KEY_VAR) {
            return Ok((
                Self { fal_key: Some(key) },
                CredentialSource::Primary,
            ));
        }

        warn!(
            "{} environment variable not found, checking {}...",
            FAL_KEY_VAR, FAL_KEY_FALLBACK_VAR
        );

        match lookup(FAL_KEY_FALLBACK_VAR) {
            Some(key) => Ok((
                Self { fal_key: Some(key) },
                CredentialSource::Fallback,
            )),
            None => Err(ConfigError::MissingCredential {
                primary: FAL_KEY_VAR,
                fallback: FAL_KEY_FALLBACK_VAR,
            }),
        }
    }

    /// Resolve the API key from the process environment.
    ///
    /// When only the fallback variable is set, its value is copied into the
    /// primary variable. Must run before any other thread reads the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let (credentials, source) = Self::resolve(|name| std::env::var(name).ok())?;

        if source == CredentialSource::Fallback {
            if let Some(key) = credentials.fal_key.as_deref() {
                // SAFETY: called from `main` before the tokio runtime is built.
                unsafe {
                    std::env::set_var(FAL_KEY_VAR, key);
                }
            }
            info!("Copied {} into {}", FAL_KEY_FALLBACK_VAR, FAL_KEY_VAR);
        } else {
            info!("{} loaded from environment", FAL_KEY_VAR);
        }

        Ok(credentials)
    }
}

/// Settings for the fal.ai queue API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalConfig {
    /// Base URL of the queue API.
    pub base_url: String,

    /// Delay between two status polls, in milliseconds.
    pub poll_interval_ms: u64,

    /// Deadline for one remote request, submission to result, in seconds.
    pub timeout_secs: u64,
}

impl FalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://queue.fal.run".to_string(),
            poll_interval_ms: 500,
            timeout_secs: 300,
        }
    }
}

/// Tool execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Upper bound on concurrently running blocking jobs (decode, resize, encode).
    pub max_blocking_workers: usize,

    /// Write buffer used while streaming downloads to disk.
    pub download_buffer_size: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_blocking_workers: 4,
            download_buffer_size: 8192,
        }
    }
}

/// Shutdown behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long in-flight operations get to finish after cancellation.
    pub grace_period_ms: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "image-gen-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig::default(),
            transport: TransportConfig::default(),
            credentials: CredentialsConfig::default(),
            fal: FalConfig::default(),
            tools: ToolsConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `MCP_`, except
    /// for the API key which uses `FAL_KEY` (or `FAL_API_KEY`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }

        config.logging = LoggingConfig::from_env();

        config.transport = TransportConfig::from_env()?;

        config.credentials = CredentialsConfig::from_env()?;

        if let Ok(base_url) = std::env::var("MCP_FAL_BASE_URL") {
            config.fal.base_url = base_url;
        }
        if let Some(ms) = parse_var("MCP_FAL_POLL_INTERVAL_MS")? {
            config.fal.poll_interval_ms = ms;
        }
        if let Some(secs) = parse_var("MCP_FAL_TIMEOUT_SECS")? {
            config.fal.timeout_secs = secs;
        }

        if let Some(workers) = parse_var::<usize>("MCP_MAX_BLOCKING_WORKERS")? {
            if workers == 0 {
                return Err(ConfigError::invalid_value(
                    "MCP_MAX_BLOCKING_WORKERS",
                    "must be at least 1",
                ));
            }
            config.tools.max_blocking_workers = workers;
        }

        if let Some(ms) = parse_var("MCP_SHUTDOWN_GRACE_MS")? {
            config.shutdown.grace_period_ms = ms;
        }

        Ok(config)
    }
}

// Mutex to ensure env var tests run serially
#[cfg(test)]
pub(crate) static ENV_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Read and parse an optional environment variable.
pub(crate) fn parse_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::invalid_value(name, e.to_string())),
        Err(_) => Ok(None),
    }
}
