//! Driver capability seam.
//!
//! The lifecycle manager only ever talks to a backend through
//! [`DatabaseDriver`]. Catalog listing is an optional capability: the factory
//! decides at construction time whether a driver gets a [`CatalogProvider`],
//! so callers check a field instead of probing at runtime.

use crate::error::DbResult;
use crate::models::{
    CatalogEntry, ConnectionConfig, DatabaseType, QueryParam, QueryRequest, QueryResult,
    TableInfo, TableSchema, WriteResult, WriteStatement,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    fn kind(&self) -> DatabaseType;

    /// Establish the connection. Must be bounded by the config timeout.
    async fn connect(&self) -> DbResult<()>;

    /// Release all resources. Idempotent.
    async fn disconnect(&self) -> DbResult<()>;

    fn is_connected(&self) -> bool;

    async fn execute_query(&self, request: &QueryRequest) -> DbResult<QueryResult>;

    async fn execute_write(
        &self,
        sql: &str,
        params: &[QueryParam],
        timeout: Duration,
    ) -> DbResult<WriteResult>;

    async fn execute_transaction(
        &self,
        statements: &[WriteStatement],
        timeout: Duration,
    ) -> DbResult<Vec<WriteResult>>;

    async fn list_tables(
        &self,
        schema: Option<&str>,
        include_views: bool,
    ) -> DbResult<Vec<TableInfo>>;

    async fn describe_table(&self, table: &str, schema: Option<&str>) -> DbResult<TableSchema>;
}

/// Lists the databases on a server.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_catalog(&self) -> DbResult<Vec<CatalogEntry>>;
}

/// A driver together with its resolved capabilities.
#[derive(Clone)]
pub struct DriverHandle {
    pub kind: DatabaseType,
    pub driver: Arc<dyn DatabaseDriver>,
    pub catalog: Option<Arc<dyn CatalogProvider>>,
}

impl DriverHandle {
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            kind: driver.kind(),
            driver,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogProvider>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn supports_catalog(&self) -> bool {
        self.catalog.is_some()
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("kind", &self.kind)
            .field("connected", &self.driver.is_connected())
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}

/// Builds unconnected drivers.
pub trait DriverFactory: Send + Sync {
    fn create(&self, config: &ConnectionConfig) -> DbResult<DriverHandle>;
}
