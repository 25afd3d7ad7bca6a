//! Query request and result models shared by every backend.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// A bound parameter for a `?`/`$n` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl QueryParam {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// A read-only query against one connection.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<QueryParam>,
    /// Default: 100, max: 10000
    pub limit: Option<u32>,
    /// Default: 30, max: 300
    pub timeout_secs: Option<u32>,
    /// Render binary columns as UTF-8 text when valid
    pub decode_binary: bool,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Row limit clamped to [1, MAX_ROW_LIMIT].
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT))
            .unwrap_or(DEFAULT_ROW_LIMIT)
    }

    /// Timeout clamped to [1, MAX_QUERY_TIMEOUT_SECS].
    pub fn effective_timeout(&self) -> u32 {
        self.timeout_secs
            .map(|t| t.clamp(1, MAX_QUERY_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS)
    }
}

/// Clamp an optional timeout the same way [`QueryRequest`] does.
pub fn effective_timeout(timeout_secs: Option<u32>) -> u32 {
    timeout_secs
        .map(|t| t.clamp(1, MAX_QUERY_TIMEOUT_SECS))
        .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// More rows were available than the limit allowed
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(
        columns: Vec<ColumnMetadata>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
        truncated: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            truncated,
            execution_time_ms,
        }
    }
}

/// Outcome of one INSERT/UPDATE/DELETE/DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WriteResult {
    pub rows_affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    pub execution_time_ms: u64,
}

/// One statement inside `execute_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteStatement {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_defaults() {
        let req = QueryRequest::new("SELECT * FROM users");
        assert_eq!(req.effective_limit(), DEFAULT_ROW_LIMIT);
        assert_eq!(req.effective_timeout(), DEFAULT_QUERY_TIMEOUT_SECS);
    }

    #[test]
    fn test_query_request_bounds() {
        let req = QueryRequest::new("SELECT 1").with_limit(99999).with_timeout(999);
        assert_eq!(req.effective_limit(), MAX_ROW_LIMIT);
        assert_eq!(req.effective_timeout(), MAX_QUERY_TIMEOUT_SECS);

        let req = QueryRequest::new("SELECT 1").with_limit(0).with_timeout(0);
        assert_eq!(req.effective_limit(), 1);
        assert_eq!(req.effective_timeout(), 1);
    }

    #[test]
    fn test_query_param_untagged_deserialize() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 42, 1.5, "x"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(42),
                QueryParam::Float(1.5),
                QueryParam::String("x".into()),
            ]
        );
        assert_eq!(params[2].type_name(), "int");
    }

    #[test]
    fn test_query_result_counts_rows() {
        let mut row = serde_json::Map::new();
        row.insert("id".into(), JsonValue::from(1));
        let result = QueryResult::new(
            vec![ColumnMetadata::new("id", "INTEGER")],
            vec![row.clone(), row],
            true,
            3,
        );
        assert_eq!(result.row_count, 2);
        assert!(result.truncated);
    }
}
