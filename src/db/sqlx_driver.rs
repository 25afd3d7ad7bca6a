//! Production driver backed by sqlx pools.

use crate::db::driver::{CatalogProvider, DatabaseDriver, DriverFactory, DriverHandle};
use crate::db::pool::{DbPool, connect_pool};
use crate::db::{executor, schema};
use crate::error::{DbError, DbResult};
use crate::models::{
    CatalogEntry, ConnectionConfig, DatabaseType, QueryParam, QueryRequest, QueryResult,
    TableInfo, TableSchema, WriteResult, WriteStatement,
};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

pub struct SqlxDriver {
    config: Arc<ConnectionConfig>,
    // std lock: never held across an await, the pool is cloned out.
    pool: RwLock<Option<DbPool>>,
}

impl SqlxDriver {
    pub fn new(config: Arc<ConnectionConfig>) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    fn current_pool(&self) -> Option<DbPool> {
        self.pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn pool(&self) -> DbResult<DbPool> {
        self.current_pool()
            .filter(|p| !p.is_closed())
            .ok_or_else(|| {
                DbError::connection(
                    format!("Connection '{}' is not established", self.config.name),
                    "Call retry_failed_connections to reconnect",
                )
            })
    }
}

#[async_trait]
impl DatabaseDriver for SqlxDriver {
    fn kind(&self) -> DatabaseType {
        self.config.kind
    }

    async fn connect(&self) -> DbResult<()> {
        let timeout_secs = self.config.timeout_secs.max(1);
        let pool = tokio::time::timeout(Duration::from_secs(timeout_secs), connect_pool(&self.config))
            .await
            .map_err(|_| DbError::timeout(format!("connect to '{}'", self.config.name), timeout_secs))??;

        let version = pool.server_version().await;
        info!(
            connection = %self.config.name,
            kind = %self.config.kind,
            server_version = ?version,
            "Connected"
        );

        let previous = self
            .pool
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(pool);
        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        let pool = self.pool.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.close().await;
            debug!(connection = %self.config.name, "Pool closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.current_pool().is_some_and(|p| !p.is_closed())
    }

    async fn execute_query(&self, request: &QueryRequest) -> DbResult<QueryResult> {
        executor::fetch(&self.pool()?, request).await
    }

    async fn execute_write(
        &self,
        sql: &str,
        params: &[QueryParam],
        timeout: Duration,
    ) -> DbResult<WriteResult> {
        executor::execute(&self.pool()?, sql, params, timeout).await
    }

    async fn execute_transaction(
        &self,
        statements: &[WriteStatement],
        timeout: Duration,
    ) -> DbResult<Vec<WriteResult>> {
        executor::execute_transaction(&self.pool()?, statements, timeout).await
    }

    async fn list_tables(
        &self,
        schema: Option<&str>,
        include_views: bool,
    ) -> DbResult<Vec<TableInfo>> {
        schema::list_tables(&self.pool()?, schema, include_views).await
    }

    async fn describe_table(&self, table: &str, schema: Option<&str>) -> DbResult<TableSchema> {
        schema::describe_table(&self.pool()?, table, schema).await
    }
}

#[async_trait]
impl CatalogProvider for SqlxDriver {
    async fn list_catalog(&self) -> DbResult<Vec<CatalogEntry>> {
        schema::list_databases(&self.pool()?).await
    }
}

/// Builds [`SqlxDriver`]s. Server backends get the catalog capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlxDriverFactory;

impl DriverFactory for SqlxDriverFactory {
    fn create(&self, config: &ConnectionConfig) -> DbResult<DriverHandle> {
        let driver = Arc::new(SqlxDriver::new(Arc::new(config.clone())));
        let handle = DriverHandle::new(driver.clone());
        Ok(match config.kind {
            DatabaseType::PostgreSQL | DatabaseType::MySQL => handle.with_catalog(driver),
            DatabaseType::SQLite => handle,
        })
    }
}
