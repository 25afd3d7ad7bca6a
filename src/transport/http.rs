//! Streamable HTTP transport served by axum.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::mcp::DbService;
use crate::transport::{Transport, close_connections, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Open SSE streams can hold the server open; give up waiting after this.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    connection_manager: Arc<ConnectionManager>,
    default_timeout_secs: u64,
    host: String,
    port: u16,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        default_timeout_secs: u64,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            connection_manager,
            default_timeout_secs,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!(bind_addr = %bind_addr, "Starting MCP server with HTTP transport");

        let manager = self.connection_manager.clone();
        let default_timeout_secs = self.default_timeout_secs;
        let service = StreamableHttpService::new(
            move || Ok(DbService::with_default_timeout(manager.clone(), default_timeout_secs)),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects "/"
        let app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        };

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;
        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        let shutdown = Arc::new(tokio::sync::Notify::new());
        let notify = shutdown.clone();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            wait_for_signal().await;
            notify.notify_one();
        });

        tokio::select! {
            result = server => match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => {
                    error!(error = %e, "HTTP server error");
                    close_connections(&self.connection_manager).await;
                    return Err(DbError::internal(format!("HTTP server error: {}", e)));
                }
            },
            _ = async {
                shutdown.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for sessions to close (send signal again to force exit)"
                );
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => warn!("Graceful shutdown timed out"),
                    _ = wait_for_signal() => warn!("Received second signal, stopping now"),
                }
            } => {}
        }

        close_connections(&self.connection_manager).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: &str) -> HttpTransport {
        HttpTransport::new(
            Arc::new(ConnectionManager::with_sqlx()),
            10,
            "0.0.0.0",
            3000,
            endpoint,
        )
    }

    #[test]
    fn test_http_transport_addressing() {
        let t = transport("/mcp");
        assert_eq!(t.name(), "http");
        assert_eq!(t.bind_addr(), "0.0.0.0:3000");
        assert_eq!(t.endpoint(), "/mcp");
        assert_eq!(transport("/").endpoint(), "/");
    }
}
