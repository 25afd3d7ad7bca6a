//! Tool decision logic behind the MCP handlers.
//!
//! - `target`: connection selection and single-active auto-detection
//! - `catalog`: `list_databases` with live/fallback selection
//! - `connections`: listing, retry, add and remove
//! - `query`, `write`, `schema`: SQL dispatch
//! - `sql_validator`: read-only enforcement for `query`

pub mod catalog;
pub mod connections;
pub mod query;
pub mod schema;
pub mod sql_validator;
pub mod target;
pub mod write;

pub use catalog::{CatalogToolHandler, DataSource, ListDatabasesInput, ListDatabasesOutput};
pub use connections::{
    AddConnectionInput, AddConnectionOutput, ConnectionInfo, ConnectionToolHandler,
    ListConnectionsInput, ListConnectionsOutput, RemoveConnectionInput, RemoveConnectionOutput,
    RetryFailedInput, RetryFailedOutput,
};
pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListTablesInput, ListTablesOutput, SchemaToolHandler,
};
pub use target::{ConnectionDescriptor, Target, resolve_target};
pub use write::{
    ExecuteInput, ExecuteOutput, ExecuteTransactionInput, ExecuteTransactionOutput,
    WriteToolHandler,
};
