//! MCP Server Entry Point
//!
//! Loads `.env`, initializes logging, resolves configuration (the image API
//! key is mandatory), then serves on the configured transport until a
//! termination signal arrives.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use image_mcp_server::core::config::LoggingConfig;
use image_mcp_server::core::{Config, McpServer, ShutdownOutcome, TransportService};

/// Command line options.
#[derive(Debug, Parser)]
#[command(name = "image-mcp-server", version, about)]
struct Cli {
    /// Port for the HTTP/SSE transport
    #[arg(long, env = "MCP_HTTP_PORT")]
    port: Option<u16>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    init_logging(&LoggingConfig::from_env());

    let cli = Cli::parse();

    // Resolved before the runtime starts: may write FAL_KEY into the environment
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        config.transport = config.transport.with_port(port);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(ShutdownOutcome::Clean) => {
            runtime.shutdown_timeout(Duration::from_millis(100));
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Ok(ShutdownOutcome::Forced) => {
            // Blocking workers may still be running; do not wait for them
            info!("Server stopped");
            std::process::exit(0);
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<ShutdownOutcome> {
    info!("Starting {} v{}", config.server.name, config.server.version);

    let server = McpServer::new(config.clone())?;
    info!("Server initialized");

    let transport = TransportService::new(config.transport, config.shutdown.grace_period());
    Ok(transport.run(server).await?)
}

/// Initialize the logging subsystem.
///
/// Configures tracing with the specified log level and format.
fn init_logging(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if config.with_timestamps {
        builder.init();
    } else {
        builder.without_time().init();
    }
}
