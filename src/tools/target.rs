//! Connection selection shared by every tool.
//!
//! An explicit name must be configured. With no name the single active
//! connection is used; zero or several active connections are an error
//! naming the candidates.

use crate::db::{ConnectionManager, DriverHandle};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionAddress, ConnectionConfig, DatabaseType};
use schemars::JsonSchema;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    /// Chosen because it was the only active connection
    pub auto_detected: bool,
}

/// Static, secret-free description of a connection for tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ConnectionDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatabaseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// SQLite file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub writable: bool,
    /// Server connection without a default database
    pub server_level: bool,
}

impl From<&ConnectionConfig> for ConnectionDescriptor {
    fn from(config: &ConnectionConfig) -> Self {
        let (host, port, database, path) = match &config.address {
            ConnectionAddress::File { path } => (None, None, None, Some(path.clone())),
            ConnectionAddress::Server {
                host,
                port,
                database,
                ..
            } => (Some(host.clone()), Some(*port), database.clone(), None),
        };
        Self {
            name: config.name.clone(),
            kind: config.kind,
            host,
            port,
            database,
            path,
            writable: config.writable,
            server_level: config.server_level(),
        }
    }
}

/// Treat a blank name the same as an omitted one.
pub fn normalize(requested: Option<&str>) -> Option<&str> {
    requested.map(str::trim).filter(|name| !name.is_empty())
}

pub async fn resolve_target(
    manager: &ConnectionManager,
    requested: Option<&str>,
) -> DbResult<Target> {
    if let Some(name) = normalize(requested) {
        if !manager.registry().contains(name).await {
            return Err(manager.unknown_connection(name).await);
        }
        return Ok(Target {
            name: name.to_string(),
            auto_detected: false,
        });
    }

    let mut active = manager.active_names().await;
    match active.len() {
        1 => Ok(Target {
            name: active.remove(0),
            auto_detected: true,
        }),
        0 => {
            let configured = manager.names().await;
            Err(DbError::invalid_input(if configured.is_empty() {
                "No database connections are configured. Use add_connection to add one.".to_string()
            } else {
                format!(
                    "No active database connections. Configured: {}. Call retry_failed_connections to reconnect, or pass `connection` explicitly.",
                    configured.join(", ")
                )
            }))
        }
        _ => Err(DbError::invalid_input(format!(
            "Multiple active connections ({}). Specify `connection`.",
            active.join(", ")
        ))),
    }
}

/// Resolve the target and obtain a live handle, connecting lazily.
pub async fn connect_target(
    manager: &ConnectionManager,
    requested: Option<&str>,
) -> DbResult<(Target, DriverHandle)> {
    let target = resolve_target(manager, requested).await?;
    let handle = manager.get_or_connect(&target.name).await?;
    Ok((target, handle))
}
