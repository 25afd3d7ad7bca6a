//! Multi-database MCP server.
//!
//! Manages named SQLite, PostgreSQL and MySQL connections and exposes them to
//! AI assistants as MCP tools: connection listing and retry, catalog
//! browsing with auto-detection and fallback data, and SQL execution.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use db::ConnectionManager;
pub use error::{DbError, DbResult};
pub use mcp::DbService;
