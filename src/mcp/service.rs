//! MCP service: the rmcp tool router over the tool handlers.

use crate::db::ConnectionManager;
use crate::models::connection::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::tools::{
    AddConnectionInput, AddConnectionOutput, CatalogToolHandler, ConnectionToolHandler,
    DescribeTableInput, DescribeTableOutput, ExecuteInput, ExecuteOutput, ExecuteTransactionInput,
    ExecuteTransactionOutput, ListConnectionsInput, ListConnectionsOutput, ListDatabasesInput,
    ListDatabasesOutput, ListTablesInput, ListTablesOutput, QueryInput, QueryOutput,
    QueryToolHandler, RemoveConnectionInput, RemoveConnectionOutput, RetryFailedInput,
    RetryFailedOutput, SchemaToolHandler, WriteToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::{ToolRouter, schema_for_type},
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct DbService {
    connection_manager: Arc<ConnectionManager>,
    /// Connect timeout for connections added at runtime
    default_timeout_secs: u64,
    tool_router: ToolRouter<Self>,
}

impl DbService {
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self::with_default_timeout(connection_manager, DEFAULT_CONNECT_TIMEOUT_SECS)
    }

    pub fn with_default_timeout(
        connection_manager: Arc<ConnectionManager>,
        default_timeout_secs: u64,
    ) -> Self {
        Self {
            connection_manager,
            default_timeout_secs,
            tool_router: Self::tool_router(),
        }
    }

    fn connections(&self) -> ConnectionToolHandler {
        ConnectionToolHandler::new(self.connection_manager.clone(), self.default_timeout_secs)
    }
}

/// Structured tool result whose protocol-level `isError` follows the payload.
fn structured_result<T: Serialize>(output: T, is_error: bool) -> Result<CallToolResult, McpError> {
    let value = serde_json::to_value(output).map_err(|e| {
        McpError::internal_error(format!("Failed to serialize tool output: {}", e), None)
    })?;
    Ok(if is_error {
        CallToolResult::structured_error(value)
    } else {
        CallToolResult::structured(value)
    })
}

#[tool_router]
impl DbService {
    #[tool(
        description = "List every configured database connection with its live status (connected, failed, configured), last error and last attempt time.\nSet include_credentials to see usernames; passwords are always masked."
    )]
    async fn list_connections(
        &self,
        Parameters(input): Parameters<ListConnectionsInput>,
    ) -> Json<ListConnectionsOutput> {
        Json(self.connections().list_connections(input).await)
    }

    #[tool(
        description = "List databases on a server connection.\n`connection` may be omitted when exactly one connection is active. If the live catalog cannot be read, typical default databases are returned with status mock_data_fallback.",
        output_schema = schema_for_type::<ListDatabasesOutput>()
    )]
    async fn list_databases(
        &self,
        Parameters(input): Parameters<ListDatabasesInput>,
    ) -> Result<CallToolResult, McpError> {
        let output = CatalogToolHandler::new(self.connection_manager.clone())
            .list_databases(input)
            .await
            .map_err(McpError::from)?;
        let is_error = output.is_error;
        structured_result(output, is_error)
    }

    #[tool(
        description = "Reconnect failed connections using their stored configuration.\nWith `connection`, retries just that one; without it, retries every disconnected connection. Connected ones are left untouched.",
        output_schema = schema_for_type::<RetryFailedOutput>()
    )]
    async fn retry_failed_connections(
        &self,
        Parameters(input): Parameters<RetryFailedInput>,
    ) -> Result<CallToolResult, McpError> {
        let output = self
            .connections()
            .retry_failed_connections(input)
            .await
            .map_err(McpError::from)?;
        let is_error = output.is_error;
        structured_result(output, is_error)
    }

    #[tool(
        description = "Add a named connection from a URL, replacing any existing connection with that name.\nReturns the resulting status; a failed connect is reported, not raised."
    )]
    async fn add_connection(
        &self,
        Parameters(input): Parameters<AddConnectionInput>,
    ) -> Result<Json<AddConnectionOutput>, McpError> {
        self.connections()
            .add_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Disconnect and remove a named connection.")]
    async fn remove_connection(
        &self,
        Parameters(input): Parameters<RemoveConnectionInput>,
    ) -> Result<Json<RemoveConnectionOutput>, McpError> {
        self.connections()
            .remove_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a read-only query (SELECT, SHOW, EXPLAIN) and return rows.\nSupports positional parameters. `connection` may be omitted when exactly one connection is active."
    )]
    async fn query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryOutput>, McpError> {
        QueryToolHandler::new(self.connection_manager.clone())
            .query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute a write statement (INSERT, UPDATE, DELETE or DDL).\nRequires a writable connection (?writable=true)."
    )]
    async fn execute(
        &self,
        Parameters(input): Parameters<ExecuteInput>,
    ) -> Result<Json<ExecuteOutput>, McpError> {
        WriteToolHandler::new(self.connection_manager.clone())
            .execute(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute several write statements atomically in one transaction.\nRolls back everything if any statement fails. Requires a writable connection."
    )]
    async fn execute_transaction(
        &self,
        Parameters(input): Parameters<ExecuteTransactionInput>,
    ) -> Result<Json<ExecuteTransactionOutput>, McpError> {
        WriteToolHandler::new(self.connection_manager.clone())
            .execute_transaction(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List tables (and optionally views).\nServer-level connections (no database in the URL) need the `schema` parameter."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        SchemaToolHandler::new(self.connection_manager.clone())
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Describe a table's columns, types, defaults and primary key.")]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        SchemaToolHandler::new(self.connection_manager.clone())
            .describe_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "multidb-mcp-server".to_owned(),
                title: Some("Multi-Database MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for named SQLite, PostgreSQL and MySQL connections.\n\
                \n\
                ## Workflow\n\
                1. Call `list_connections` to see every connection and whether it is live\n\
                2. Pass `connection` to other tools; it may be omitted when exactly one is connected\n\
                3. If connections failed, fix the cause and call `retry_failed_connections`\n\
                \n\
                ## Notes\n\
                - `query` is read-only; `execute` and `execute_transaction` need ?writable=true\n\
                - `list_databases` returns status `mock_data_fallback` when the live catalog is unreachable\n\
                - SQLite has no server catalog: each file is one database\n\
                - Connections can be added or replaced at runtime with `add_connection`"
                    .to_string(),
            ),
        }
    }
}
