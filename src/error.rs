//! Error types for the multi-database MCP server.
//!
//! All fallible operations return [`DbResult`]. Variants carry enough context
//! (suggestions, the list of valid connection names) for an AI assistant to
//! recover without another round trip.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Unknown connection '{name}'. Available connections: {}", format_names(.available))]
    UnknownConnection {
        name: String,
        available: Vec<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Disconnect of '{name}' failed: {message}")]
    Disconnect { name: String, message: String },

    #[error("Catalog query failed: {message}")]
    Catalog { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "(none configured)".to_string()
    } else {
        names.join(", ")
    }
}

impl DbError {
    /// Create an unknown connection error listing every configured name.
    pub fn unknown_connection(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::UnknownConnection {
            name: name.into(),
            available,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn disconnect(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Disconnect {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::UnknownConnection { .. } => {
                Some("Call list_connections to see the configured connection names")
            }
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or optimizing the operation")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Retry the connection")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            other => DbError::internal(format!("Unknown database error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::UnknownConnection { available, .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                Some(serde_json::json!({
                    "available_connections": available,
                    "suggestion": err.suggestion(),
                })),
            ),

            DbError::InvalidInput { .. }
            | DbError::Permission { .. }
            | DbError::Schema { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),

            DbError::Database {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Connection { .. }
            | DbError::Disconnect { .. }
            | DbError::Catalog { .. }
            | DbError::Timeout { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_connection_lists_names() {
        let err = DbError::unknown_connection("ghost", vec!["db1".into(), "db2".into()]);
        let msg = err.to_string();
        assert!(msg.contains("ghost"));
        assert!(msg.contains("db1, db2"));
    }

    #[test]
    fn test_unknown_connection_with_nothing_configured() {
        let err = DbError::unknown_connection("ghost", Vec::new());
        assert!(err.to_string().contains("(none configured)"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::permission("write", "read-only").is_retryable());
        assert!(!DbError::unknown_connection("x", vec![]).is_retryable());
    }

    #[test]
    fn test_unknown_connection_maps_to_resource_not_found() {
        let err = DbError::unknown_connection("x", vec!["a".into()]);
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32002);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["available_connections"][0], "a");
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::invalid_input("bad input").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_permission_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::permission("write", "read-only").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_connection_maps_to_internal_error_with_suggestion() {
        let mcp_err: rmcp::ErrorData = DbError::connection("failed", "try reconnecting").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "try reconnecting");
    }

    #[test]
    fn test_database_error_includes_sql_state() {
        let err = DbError::database("syntax error", Some("42601".to_string()), "check syntax");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("42601"));
    }

    #[test]
    fn test_disconnect_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::disconnect("db1", "socket closed").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert!(mcp_err.message.contains("db1"));
    }
}
