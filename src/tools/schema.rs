//! Schema introspection tools: `list_tables` and `describe_table`.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::models::{TableInfo, TableSchema};
use crate::tools::target::connect_target;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Optional when exactly one connection is active
    #[serde(default)]
    pub connection: Option<String>,
    /// Schema (PostgreSQL) or database (MySQL). Required for server-level connections.
    #[serde(default)]
    pub schema: Option<String>,
    /// Include views. Default: true
    #[serde(default = "default_true")]
    pub include_views: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    pub connection: String,
    pub auto_detected: bool,
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    #[serde(default)]
    pub connection: Option<String>,
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    pub connection: String,
    pub auto_detected: bool,
    #[serde(flatten)]
    pub table: TableSchema,
}

pub struct SchemaToolHandler {
    connection_manager: Arc<ConnectionManager>,
}

impl SchemaToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let (target, handle) =
            connect_target(&self.connection_manager, input.connection.as_deref()).await?;
        let schema = input.schema.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let tables = handle.driver.list_tables(schema, input.include_views).await?;

        info!(connection = %target.name, count = tables.len(), "Listed tables");
        Ok(ListTablesOutput {
            connection: target.name,
            auto_detected: target.auto_detected,
            count: tables.len(),
            tables,
        })
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<DescribeTableOutput> {
        let table_name = input.table_name.trim();
        if table_name.is_empty() {
            return Err(DbError::invalid_input("table_name cannot be empty"));
        }
        let (target, handle) =
            connect_target(&self.connection_manager, input.connection.as_deref()).await?;
        let schema = input.schema.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let table = handle.driver.describe_table(table_name, schema).await?;

        Ok(DescribeTableOutput {
            connection: target.name,
            auto_detected: target.auto_detected,
            table,
        })
    }
}
