//! multidb-mcp-server entry point.

use clap::Parser;
use multidb_mcp_server::config::{Config, TransportMode};
use multidb_mcp_server::db::ConnectionManager;
use multidb_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        transport = %config.transport,
        "Starting multidb-mcp-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_configs = config.parse_databases()?;
    if db_configs.is_empty() {
        warn!("No databases configured; use --database or the add_connection tool");
    }

    let connection_manager = Arc::new(ConnectionManager::with_sqlx());
    let summary = connection_manager.initialize(db_configs).await;
    if summary.attempted > 0 && summary.succeeded == 0 {
        warn!("No connection could be established; tools will report fallback data until retried");
    }

    let result = match config.transport {
        TransportMode::Stdio => {
            StdioTransport::new(connection_manager, config.connect_timeout)
                .run()
                .await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                connection_manager,
                config.connect_timeout,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
