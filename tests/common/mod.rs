//! Recording mock driver shared by the integration tests.
//!
//! Every connect/disconnect is appended to an event log as `connect:<name>`
//! or `disconnect:<name>`, so tests can assert ordering without a server.

#![allow(dead_code)]

use async_trait::async_trait;
use multidb_mcp_server::db::{
    CatalogProvider, ConnectionManager, DatabaseDriver, DriverFactory, DriverHandle,
};
use multidb_mcp_server::error::{DbError, DbResult};
use multidb_mcp_server::models::{
    CatalogEntry, ColumnMetadata, ConnectionConfig, DatabaseType, QueryParam, QueryRequest,
    QueryResult, TableInfo, TableSchema, TableType, WriteResult, WriteStatement,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Behaviour {
    events: Vec<String>,
    refuse_connect: HashSet<String>,
    fail_catalog: HashSet<String>,
    fail_disconnect: HashSet<String>,
    connect_delay: HashMap<String, Duration>,
}

#[derive(Default, Clone)]
pub struct MockDriverFactory {
    behaviour: Arc<Mutex<Behaviour>>,
}

impl MockDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager wired to this factory.
    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(Arc::new(self.clone())))
    }

    pub fn refuse(&self, name: &str) {
        self.with(|b| {
            b.refuse_connect.insert(name.to_string());
        });
    }

    pub fn accept(&self, name: &str) {
        self.with(|b| {
            b.refuse_connect.remove(name);
        });
    }

    pub fn fail_catalog(&self, name: &str) {
        self.with(|b| {
            b.fail_catalog.insert(name.to_string());
        });
    }

    pub fn fail_disconnect(&self, name: &str) {
        self.with(|b| {
            b.fail_disconnect.insert(name.to_string());
        });
    }

    pub fn delay_connect(&self, name: &str, delay: Duration) {
        self.with(|b| {
            b.connect_delay.insert(name.to_string(), delay);
        });
    }

    pub fn events(&self) -> Vec<String> {
        self.with(|b| b.events.clone())
    }

    pub fn clear_events(&self) {
        self.with(|b| b.events.clear());
    }

    fn with<T>(&self, f: impl FnOnce(&mut Behaviour) -> T) -> T {
        f(&mut self.behaviour.lock().unwrap())
    }
}

impl DriverFactory for MockDriverFactory {
    fn create(&self, config: &ConnectionConfig) -> DbResult<DriverHandle> {
        let driver = Arc::new(MockDriver {
            name: config.name.clone(),
            kind: config.kind,
            connected: AtomicBool::new(false),
            factory: self.clone(),
        });
        let handle = DriverHandle::new(driver.clone());
        Ok(match config.kind {
            DatabaseType::SQLite => handle,
            _ => handle.with_catalog(driver),
        })
    }
}

pub struct MockDriver {
    name: String,
    kind: DatabaseType,
    connected: AtomicBool,
    factory: MockDriverFactory,
}

#[async_trait]
impl DatabaseDriver for MockDriver {
    fn kind(&self) -> DatabaseType {
        self.kind
    }

    async fn connect(&self) -> DbResult<()> {
        let delay = self
            .factory
            .with(|b| b.connect_delay.get(&self.name).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let refused = self.factory.with(|b| {
            b.events.push(format!("connect:{}", self.name));
            b.refuse_connect.contains(&self.name)
        });
        if refused {
            return Err(DbError::connection(
                format!("connection refused by {}", self.name),
                "Check that the server is running",
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let fails = self.factory.with(|b| {
            b.events.push(format!("disconnect:{}", self.name));
            b.fail_disconnect.contains(&self.name)
        });
        if fails {
            return Err(DbError::internal(format!("socket already closed for {}", self.name)));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn execute_query(&self, _request: &QueryRequest) -> DbResult<QueryResult> {
        let mut row = serde_json::Map::new();
        row.insert("served_by".to_string(), json!(self.name));
        Ok(QueryResult::new(
            vec![ColumnMetadata::new("served_by", "TEXT")],
            vec![row],
            false,
            1,
        ))
    }

    async fn execute_write(
        &self,
        _sql: &str,
        _params: &[QueryParam],
        _timeout: Duration,
    ) -> DbResult<WriteResult> {
        Ok(WriteResult {
            rows_affected: 1,
            last_insert_id: None,
            execution_time_ms: 1,
        })
    }

    async fn execute_transaction(
        &self,
        statements: &[WriteStatement],
        _timeout: Duration,
    ) -> DbResult<Vec<WriteResult>> {
        Ok(statements
            .iter()
            .map(|_| WriteResult {
                rows_affected: 1,
                last_insert_id: None,
                execution_time_ms: 1,
            })
            .collect())
    }

    async fn list_tables(
        &self,
        _schema: Option<&str>,
        _include_views: bool,
    ) -> DbResult<Vec<TableInfo>> {
        Ok(vec![TableInfo::new("users", TableType::Table)])
    }

    async fn describe_table(&self, table: &str, _schema: Option<&str>) -> DbResult<TableSchema> {
        Ok(TableSchema::new(table))
    }
}

#[async_trait]
impl CatalogProvider for MockDriver {
    async fn list_catalog(&self) -> DbResult<Vec<CatalogEntry>> {
        if self.factory.with(|b| b.fail_catalog.contains(&self.name)) {
            return Err(DbError::catalog(format!("permission denied on {}", self.name)));
        }
        Ok(vec![CatalogEntry::new(format!("{}_live", self.name))])
    }
}

pub fn pg(name: &str, database: &str) -> ConnectionConfig {
    ConnectionConfig::server(
        name,
        DatabaseType::PostgreSQL,
        "localhost",
        None,
        Some(database.to_string()),
    )
}

pub fn mysql(name: &str) -> ConnectionConfig {
    ConnectionConfig::server(name, DatabaseType::MySQL, "localhost", None, None)
}

pub fn sqlite(name: &str) -> ConnectionConfig {
    ConnectionConfig::sqlite(name, format!("/data/{}.db", name))
}
