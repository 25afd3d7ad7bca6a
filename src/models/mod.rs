//! Data models for the multi-database MCP server.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{
    ConnectionAddress, ConnectionConfig, ConnectionState, ConnectionStatus, DatabaseType,
    MASKED_PASSWORD,
};
pub use query::{
    ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS,
    MAX_ROW_LIMIT, QueryParam, QueryRequest, QueryResult, WriteResult, WriteStatement,
};
pub use schema::{CatalogEntry, ColumnDefinition, TableInfo, TableSchema, TableType};
