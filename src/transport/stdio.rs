//! Stdio transport: JSON-RPC over stdin/stdout.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::mcp::DbService;
use crate::transport::{Transport, close_connections, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StdioTransport {
    connection_manager: Arc<ConnectionManager>,
    default_timeout_secs: u64,
}

impl StdioTransport {
    pub fn new(connection_manager: Arc<ConnectionManager>, default_timeout_secs: u64) -> Self {
        Self {
            connection_manager,
            default_timeout_secs,
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let service =
            DbService::with_default_timeout(self.connection_manager.clone(), self.default_timeout_secs);
        let running = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let signalled = tokio::select! {
            result = running.waiting() => {
                if let Err(e) = result {
                    warn!(error = %e, "Stdio transport error");
                    close_connections(&self.connection_manager).await;
                    return Err(DbError::internal(format!("Stdio transport error: {}", e)));
                }
                info!("Client disconnected");
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if signalled {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        close_connections(&self.connection_manager).await;

        if signalled {
            // stdin reads block and cannot be cancelled by select!
            info!("Exiting process");
            std::process::exit(0);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
