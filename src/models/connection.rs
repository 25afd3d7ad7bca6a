//! Connection-related data models.
//!
//! A [`ConnectionConfig`] is the immutable description of one backend target;
//! a [`ConnectionStatus`] is the mutable per-name record kept by the registry.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Default per-connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default pool size for server databases.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// SQLite serialises writers, so one pooled connection is enough.
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;

/// Literal shown in place of a configured password.
pub const MASKED_PASSWORD: &str = "********";

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Lowercase identifier used in tool output ("postgresql", "mysql", "sqlite").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    fn url_scheme(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Where a backend lives.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionAddress {
    /// SQLite database file.
    File { path: String },
    /// Network server (PostgreSQL / MySQL).
    Server {
        host: String,
        port: u16,
        /// None for server-level connections
        database: Option<String>,
        username: Option<String>,
        /// Sensitive - never logged or serialized
        password: Option<String>,
    },
}

impl std::fmt::Debug for ConnectionAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File { path } => f.debug_struct("File").field("path", path).finish(),
            Self::Server {
                host,
                port,
                database,
                username,
                password,
            } => f
                .debug_struct("Server")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .field("username", username)
                .field("password", &password.as_ref().map(|_| MASKED_PASSWORD))
                .finish(),
        }
    }
}

/// Immutable configuration of one named connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub name: String,
    pub kind: DatabaseType,
    pub address: ConnectionAddress,
    /// Default: false for safety
    pub writable: bool,
    pub max_connections: u32,
    /// Bounds connect and pool acquire
    pub timeout_secs: u64,
    /// Driver options carried through from the source URL (e.g. sslmode).
    pub driver_params: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Create a SQLite configuration for a database file.
    pub fn sqlite(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DatabaseType::SQLite,
            address: ConnectionAddress::File { path: path.into() },
            writable: false,
            max_connections: DEFAULT_MAX_CONNECTIONS_SQLITE,
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            driver_params: BTreeMap::new(),
        }
    }

    /// Create a configuration for a PostgreSQL or MySQL server.
    pub fn server(
        name: impl Into<String>,
        kind: DatabaseType,
        host: impl Into<String>,
        port: Option<u16>,
        database: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            address: ConnectionAddress::Server {
                host: host.into(),
                port: port.or(kind.default_port()).unwrap_or_default(),
                database,
                username: None,
                password: None,
            },
            writable: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            driver_params: BTreeMap::new(),
        }
    }

    /// Set credentials on a server configuration. No-op for SQLite.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        if let ConnectionAddress::Server {
            username: u,
            password: p,
            ..
        } = &mut self.address
        {
            *u = Some(username.into());
            *p = password;
        }
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Database name for server connections, file path for SQLite.
    pub fn database(&self) -> Option<&str> {
        match &self.address {
            ConnectionAddress::File { path } => Some(path),
            ConnectionAddress::Server { database, .. } => database.as_deref(),
        }
    }

    pub fn host(&self) -> Option<&str> {
        match &self.address {
            ConnectionAddress::Server { host, .. } => Some(host),
            ConnectionAddress::File { .. } => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match &self.address {
            ConnectionAddress::Server { port, .. } => Some(*port),
            ConnectionAddress::File { .. } => None,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match &self.address {
            ConnectionAddress::File { path } => Some(path),
            ConnectionAddress::Server { .. } => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match &self.address {
            ConnectionAddress::Server { username, .. } => username.as_deref(),
            ConnectionAddress::File { .. } => None,
        }
    }

    pub fn has_password(&self) -> bool {
        matches!(
            &self.address,
            ConnectionAddress::Server {
                password: Some(_),
                ..
            }
        )
    }

    /// True if the connection targets a server without a default database.
    pub fn server_level(&self) -> bool {
        matches!(
            &self.address,
            ConnectionAddress::Server { database: None, .. }
        )
    }

    /// Full driver URL including credentials. Sensitive - never log.
    pub fn connection_url(&self) -> String {
        let mut url = match &self.address {
            ConnectionAddress::File { path } => format!("sqlite:{}", path),
            ConnectionAddress::Server {
                host,
                port,
                database,
                username,
                password,
            } => {
                let mut url = format!("{}://", self.kind.url_scheme());
                if let Some(user) = username {
                    url.push_str(&encode_userinfo(user));
                    if let Some(pass) = password {
                        url.push(':');
                        url.push_str(&encode_userinfo(pass));
                    }
                    url.push('@');
                }
                url.push_str(&format!("{}:{}", host, port));
                if let Some(db) = database {
                    url.push('/');
                    url.push_str(db);
                }
                url
            }
        };

        if !self.driver_params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.driver_params.iter())
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// Display-safe driver URL (password masked).
    pub fn masked_url(&self) -> String {
        match &self.address {
            ConnectionAddress::Server {
                password: Some(_), ..
            } => {
                let mut masked = self.clone();
                if let ConnectionAddress::Server { password, .. } = &mut masked.address {
                    *password = Some(MASKED_PASSWORD.to_string());
                }
                masked.connection_url()
            }
            _ => self.connection_url(),
        }
    }
}

fn encode_userinfo(value: &str) -> String {
    // Url::set_username/set_password apply the userinfo percent-encode set.
    let mut url = match Url::parse("mysql://placeholder") {
        Ok(url) => url,
        Err(_) => return value.to_string(),
    };
    if url.set_username(value).is_err() {
        return value.to_string();
    }
    url.username().to_string()
}

/// Mutable status record for one configured connection.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub config: Arc<ConnectionConfig>,
    pub connected: bool,
    pub error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    /// A configured entry that has never been attempted.
    pub fn unattempted(config: Arc<ConnectionConfig>) -> Self {
        Self {
            config,
            connected: false,
            error: None,
            last_attempt: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else if self.error.is_some() {
            ConnectionState::Failed
        } else {
            ConnectionState::Configured
        }
    }
}

/// Classification of a connection in tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Failed,
    /// Never attempted, or an attempt is still in flight
    Configured,
}
