//! `list_databases`: catalog listing with auto-detection and a canned
//! fallback when the live catalog cannot be read.

use crate::db::ConnectionManager;
use crate::error::DbResult;
use crate::models::{CatalogEntry, ConnectionConfig, ConnectionState, DatabaseType};
use crate::tools::connections::ConnectionInfo;
use crate::tools::target::{ConnectionDescriptor, normalize};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Remediation shown when nothing is connected.
pub const NO_ACTIVE_SUGGESTIONS: [&str; 3] = [
    "Verify the database server is running and reachable from this host",
    "Check the credentials and database name in the connection URL",
    "Call the retry_failed_connections tool to reconnect",
];

const SQLITE_CATALOG_NOTE: &str =
    "SQLite has no server catalog; each file is a single database";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    RealData,
    MockDataFallback,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListDatabasesInput {
    /// Connection to list. Optional when exactly one connection is active.
    #[serde(default)]
    pub connection: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    pub is_error: bool,
    /// The connection was picked because it was the only active one
    pub auto_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DataSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDescriptor>,
    pub databases: Vec<CatalogEntry>,
    pub count: usize,
    /// Why the live catalog could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configured_connections: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ListDatabasesOutput {
    fn catalog(
        config: &ConnectionConfig,
        auto_detected: bool,
        status: DataSource,
        databases: Vec<CatalogEntry>,
    ) -> Self {
        Self {
            is_error: false,
            auto_detected,
            status: Some(status),
            connection: Some(ConnectionDescriptor::from(config)),
            count: databases.len(),
            databases,
            error: None,
            note: None,
            message: None,
            configured_connections: Vec::new(),
            connections: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn overview(message: String, is_error: bool, connections: Vec<ConnectionInfo>) -> Self {
        Self {
            is_error,
            auto_detected: false,
            status: None,
            connection: None,
            databases: Vec::new(),
            count: 0,
            error: None,
            note: None,
            message: Some(message),
            configured_connections: connections
                .iter()
                .map(|c| c.connection.name.clone())
                .collect(),
            connections,
            suggestions: Vec::new(),
        }
    }
}

/// Deterministic stand-in catalog for a connection whose live catalog
/// failed. `<database>` falls back to the connection name.
pub fn fallback_catalog(config: &ConnectionConfig) -> Vec<CatalogEntry> {
    let database = config.database().unwrap_or(&config.name);
    let system: &[&str] = match config.kind {
        DatabaseType::PostgreSQL => &["postgres", "template0", "template1"],
        DatabaseType::MySQL => &["information_schema", "mysql", "performance_schema", "sys"],
        DatabaseType::SQLite => {
            return vec![
                CatalogEntry::new(database)
                    .with_path(database)
                    .with_note(SQLITE_CATALOG_NOTE),
            ];
        }
    };

    let mut entries: Vec<CatalogEntry> = system.iter().map(|n| CatalogEntry::new(*n)).collect();
    if !system.contains(&database) {
        entries.push(CatalogEntry::new(database));
    }
    entries
}

pub struct CatalogToolHandler {
    connection_manager: Arc<ConnectionManager>,
}

impl CatalogToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub async fn list_databases(&self, input: ListDatabasesInput) -> DbResult<ListDatabasesOutput> {
        if let Some(name) = normalize(input.connection.as_deref()) {
            return self.list_for(name, false).await;
        }

        let snapshot = self.connection_manager.snapshot().await;
        let active: Vec<&str> = snapshot
            .iter()
            .filter(|s| s.connected)
            .map(|s| s.name())
            .collect();

        match active.as_slice() {
            [only] => {
                let name = only.to_string();
                self.list_for(&name, true).await
            }
            [] => {
                let connections = snapshot
                    .iter()
                    .map(|s| ConnectionInfo::from_status(s, false))
                    .collect();
                let mut output = ListDatabasesOutput::overview(
                    "No active database connections".to_string(),
                    true,
                    connections,
                );
                output.suggestions = NO_ACTIVE_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
                Ok(output)
            }
            many => {
                let message = format!(
                    "{} active connections. Specify `connection` to list databases for one of them.",
                    many.len()
                );
                let connections = snapshot
                    .iter()
                    .map(|s| {
                        let mut info = ConnectionInfo::from_status(s, false);
                        if !s.connected {
                            info.status = ConnectionState::Configured;
                        }
                        info
                    })
                    .collect();
                Ok(ListDatabasesOutput::overview(message, false, connections))
            }
        }
    }

    /// Catalog for one known connection. Only an unknown name is an error;
    /// every other failure degrades to the fallback dataset.
    async fn list_for(&self, name: &str, auto_detected: bool) -> DbResult<ListDatabasesOutput> {
        let Some(config) = self.connection_manager.registry().config(name).await else {
            return Err(self.connection_manager.unknown_connection(name).await);
        };

        match self.fetch_live(name, &config).await {
            Ok(databases) => {
                info!(connection = %name, count = databases.len(), auto_detected, "Listed databases");
                Ok(ListDatabasesOutput::catalog(
                    &config,
                    auto_detected,
                    DataSource::RealData,
                    databases,
                ))
            }
            Err(e) => {
                warn!(connection = %name, error = %e, "Catalog unavailable, returning fallback data");
                let mut output = ListDatabasesOutput::catalog(
                    &config,
                    auto_detected,
                    DataSource::MockDataFallback,
                    fallback_catalog(&config),
                );
                output.error = Some(e.to_string());
                output.note = Some(
                    "Live catalog could not be read; these entries are typical defaults, not server data"
                        .to_string(),
                );
                Ok(output)
            }
        }
    }

    async fn fetch_live(&self, name: &str, config: &ConnectionConfig) -> DbResult<Vec<CatalogEntry>> {
        let handle = self.connection_manager.get_or_connect(name).await?;
        match &handle.catalog {
            Some(catalog) => catalog.list_catalog().await,
            None => {
                let path = config.file_path().unwrap_or(&config.name);
                Ok(vec![
                    CatalogEntry::new(path)
                        .with_path(path)
                        .with_note(SQLITE_CATALOG_NOTE),
                ])
            }
        }
    }
}
