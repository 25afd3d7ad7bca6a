//! Write tools: `execute` and `execute_transaction`.

use crate::db::{ConnectionManager, DriverHandle};
use crate::error::{DbError, DbResult};
use crate::models::query::effective_timeout;
use crate::models::{QueryParam, WriteResult, WriteStatement};
use crate::tools::sql_validator;
use crate::tools::target::{Target, resolve_target};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteInput {
    /// Connection name. Must be writable (?writable=true). Optional when exactly one connection is active.
    #[serde(default)]
    pub connection: Option<String>,
    /// INSERT, UPDATE, DELETE or DDL statement
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Default: 30, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteOutput {
    pub connection: String,
    pub auto_detected: bool,
    #[serde(flatten)]
    pub result: WriteResult,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteTransactionInput {
    #[serde(default)]
    pub connection: Option<String>,
    /// Statements run in order inside one transaction
    pub statements: Vec<WriteStatement>,
    /// Applies to the whole transaction. Default: 30, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteTransactionOutput {
    pub connection: String,
    pub auto_detected: bool,
    pub committed: bool,
    pub results: Vec<WriteResult>,
    pub total_rows_affected: u64,
    pub execution_time_ms: u64,
}

pub struct WriteToolHandler {
    connection_manager: Arc<ConnectionManager>,
}

impl WriteToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }

    /// Resolve a writable target before connecting.
    async fn writable_target(&self, requested: Option<&str>) -> DbResult<(Target, DriverHandle)> {
        let target = resolve_target(&self.connection_manager, requested).await?;
        let writable = self
            .connection_manager
            .registry()
            .config(&target.name)
            .await
            .is_some_and(|c| c.writable);
        if !writable {
            return Err(DbError::permission(
                "write operation",
                format!(
                    "Connection '{}' is read-only. Add ?writable=true to its URL to enable writes",
                    target.name
                ),
            ));
        }
        let handle = self.connection_manager.get_or_connect(&target.name).await?;
        Ok((target, handle))
    }

    pub async fn execute(&self, input: ExecuteInput) -> DbResult<ExecuteOutput> {
        let (target, handle) = self.writable_target(input.connection.as_deref()).await?;
        if sql_validator::is_readonly(&input.sql, handle.kind) {
            return Err(DbError::invalid_input(
                "This is a read-only statement. Use the query tool instead of execute.",
            ));
        }

        let timeout = Duration::from_secs(effective_timeout(input.timeout_secs) as u64);
        let result = handle
            .driver
            .execute_write(&input.sql, &input.params, timeout)
            .await?;

        info!(
            connection = %target.name,
            rows_affected = result.rows_affected,
            execution_time_ms = result.execution_time_ms,
            "Write executed"
        );

        Ok(ExecuteOutput {
            connection: target.name,
            auto_detected: target.auto_detected,
            result,
        })
    }

    pub async fn execute_transaction(
        &self,
        input: ExecuteTransactionInput,
    ) -> DbResult<ExecuteTransactionOutput> {
        if input.statements.is_empty() {
            return Err(DbError::invalid_input("Transaction must contain at least one statement"));
        }
        let (target, handle) = self.writable_target(input.connection.as_deref()).await?;

        let start = Instant::now();
        let timeout = Duration::from_secs(effective_timeout(input.timeout_secs) as u64);
        let results = handle
            .driver
            .execute_transaction(&input.statements, timeout)
            .await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        let total_rows_affected = results.iter().map(|r| r.rows_affected).sum();

        info!(
            connection = %target.name,
            statements = results.len(),
            total_rows_affected,
            execution_time_ms,
            "Transaction committed"
        );

        Ok(ExecuteTransactionOutput {
            connection: target.name,
            auto_detected: target.auto_detected,
            committed: true,
            results,
            total_rows_affected,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_input_defaults() {
        let input: ExecuteInput =
            serde_json::from_str(r#"{"sql": "INSERT INTO t VALUES (?)", "params": [1]}"#).unwrap();
        assert!(input.connection.is_none());
        assert_eq!(input.params, vec![QueryParam::Int(1)]);
        assert!(input.timeout_secs.is_none());
    }

    #[test]
    fn test_execute_output_flattens_result() {
        let output = ExecuteOutput {
            connection: "local".into(),
            auto_detected: true,
            result: WriteResult {
                rows_affected: 2,
                last_insert_id: Some(7),
                execution_time_ms: 3,
            },
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["rows_affected"], 2);
        assert_eq!(json["last_insert_id"], 7);
        assert_eq!(json["auto_detected"], true);
    }

    #[test]
    fn test_transaction_input_statements() {
        let input: ExecuteTransactionInput = serde_json::from_str(
            r#"{"statements": [{"sql": "DELETE FROM a"}, {"sql": "INSERT INTO a VALUES (?)", "params": ["x"]}]}"#,
        )
        .unwrap();
        assert_eq!(input.statements.len(), 2);
        assert!(input.statements[0].params.is_empty());
    }
}
