//! MCP transports. Both close every database connection on shutdown.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::db::ConnectionManager;
use crate::error::DbResult;
use std::future::Future;
use tokio::signal;
use tracing::info;

pub trait Transport: Send + Sync {
    /// Serve until the client disconnects or a shutdown signal arrives.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    fn name(&self) -> &'static str;
}

/// Disconnect everything and log the outcome.
pub(crate) async fn close_connections(manager: &ConnectionManager) {
    info!("Closing all database connections");
    let report = manager.disconnect_all().await;
    if !report.failures.is_empty() {
        tracing::warn!(
            failures = report.failures.len(),
            "Some connections did not disconnect cleanly"
        );
    }
}

/// Resolves on SIGINT or SIGTERM.
pub(crate) async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
