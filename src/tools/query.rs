//! `query`: read-only SQL against one connection.

use crate::db::ConnectionManager;
use crate::error::DbResult;
use crate::models::{ColumnMetadata, QueryParam, QueryRequest};
use crate::tools::sql_validator;
use crate::tools::target::connect_target;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

fn default_decode_binary() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// Connection name from list_connections. Optional when exactly one connection is active.
    #[serde(default)]
    pub connection: Option<String>,
    /// SQL SELECT statement. Writes, DDL and transaction control are rejected.
    pub sql: String,
    /// Positional parameters (use ? or $1,$2... placeholders in SQL)
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Query timeout in seconds. Default: 30, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
    /// Decode binary columns as UTF-8 text when valid (default), otherwise base64
    #[serde(default = "default_decode_binary")]
    pub decode_binary: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    pub connection: String,
    pub auto_detected: bool,
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// More rows matched than the limit allowed
    pub truncated: bool,
    pub execution_time_ms: u64,
}

pub struct QueryToolHandler {
    connection_manager: Arc<ConnectionManager>,
}

impl QueryToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub async fn query(&self, input: QueryInput) -> DbResult<QueryOutput> {
        let (target, handle) =
            connect_target(&self.connection_manager, input.connection.as_deref()).await?;
        sql_validator::validate_readonly(&input.sql, handle.kind)?;

        let request = QueryRequest {
            sql: input.sql,
            params: input.params,
            limit: input.limit,
            timeout_secs: input.timeout_secs,
            decode_binary: input.decode_binary,
        };
        let result = handle.driver.execute_query(&request).await?;

        info!(
            connection = %target.name,
            auto_detected = target.auto_detected,
            row_count = result.row_count,
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        Ok(QueryOutput {
            connection: target.name,
            auto_detected: target.auto_detected,
            columns: result.columns,
            rows: result.rows,
            row_count: result.row_count,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_input_defaults() {
        let input: QueryInput = serde_json::from_str(r#"{"sql": "SELECT 1"}"#).unwrap();
        assert!(input.connection.is_none());
        assert!(input.params.is_empty());
        assert!(input.limit.is_none());
        assert!(input.decode_binary);
    }

    #[test]
    fn test_query_input_mixed_params() {
        let input: QueryInput = serde_json::from_str(
            r#"{"connection": "pg", "sql": "SELECT $1, $2, $3, $4", "params": ["a", 1, 2.5, null]}"#,
        )
        .unwrap();
        assert_eq!(
            input.params,
            vec![
                QueryParam::String("a".into()),
                QueryParam::Int(1),
                QueryParam::Float(2.5),
                QueryParam::Null
            ]
        );
    }
}
