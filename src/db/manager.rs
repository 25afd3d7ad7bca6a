//! Connection lifecycle manager.
//!
//! Owns the [`ConnectionRegistry`] and a [`DriverFactory`]. Every connect goes
//! through the same transition: `upsert_attempt_start`, disconnect whatever
//! handle was live, build and connect a fresh driver, then `record_success`
//! or `record_failure`. Driver calls never run under the registry lock.

use crate::db::driver::{DriverFactory, DriverHandle};
use crate::db::registry::ConnectionRegistry;
use crate::db::sqlx_driver::SqlxDriverFactory;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, ConnectionStatus};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct FailedConnection {
    pub name: String,
    pub error: String,
}

/// Outcome of bulk initialization. Zero successes is a valid end state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitializeSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetryOutcome {
    AlreadyConnected,
    Reconnected,
    Failed { error: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryReport {
    /// Connections a connect was actually attempted for
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedConnection>,
    pub outcomes: BTreeMap<String, RetryOutcome>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    pub disconnected: Vec<String>,
    pub failures: Vec<FailedConnection>,
}

pub struct ConnectionManager {
    registry: ConnectionRegistry,
    factory: Arc<dyn DriverFactory>,
    /// One lock per name so concurrent lazy connects share a single attempt
    connect_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            factory,
            connect_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Manager backed by real sqlx pools.
    pub fn with_sqlx() -> Self {
        Self::new(Arc::new(SqlxDriverFactory))
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Attempt every config concurrently and independently. Configs are keyed
    /// by name; when a name repeats, the last config wins.
    pub async fn initialize(
        &self,
        configs: impl IntoIterator<Item = ConnectionConfig>,
    ) -> InitializeSummary {
        let mut by_name = BTreeMap::new();
        for config in configs {
            if let Some(replaced) = by_name.insert(config.name.clone(), config) {
                warn!(connection = %replaced.name, "Duplicate connection name, keeping the last config");
            }
        }

        let attempts = by_name.into_values().map(|config| async move {
            let name = config.name.clone();
            (name, self.attempt(Arc::new(config)).await)
        });
        let results = join_all(attempts).await;

        let mut summary = InitializeSummary {
            attempted: results.len(),
            ..Default::default()
        };
        for (name, result) in results {
            match result {
                Ok(_) => summary.succeeded += 1,
                Err(e) => summary.failed.push(FailedConnection {
                    name,
                    error: e.to_string(),
                }),
            }
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            "Connection initialization finished"
        );
        for failure in &summary.failed {
            warn!(connection = %failure.name, error = %failure.error, "Connection failed at startup");
        }
        summary
    }

    /// Create or replace a connection. Never fails: the outcome is in the
    /// returned status.
    pub async fn add_connection(&self, config: ConnectionConfig) -> ConnectionStatus {
        let config = Arc::new(config);
        let result = self.attempt(config.clone()).await;
        self.status_after(config, result.err()).await
    }

    /// Like [`add_connection`](Self::add_connection), but a failed connect is
    /// returned as an error.
    pub async fn connect(&self, config: ConnectionConfig) -> DbResult<ConnectionStatus> {
        let config = Arc::new(config);
        match self.attempt(config.clone()).await {
            Ok(_) => Ok(self.status_after(config, None).await),
            Err(e) => Err(e),
        }
    }

    /// Disconnect and forget `name`. `Ok(false)` if it was not configured.
    /// The entry is gone even when the disconnect itself fails.
    pub async fn remove_connection(&self, name: &str) -> DbResult<bool> {
        let Some((_, handle)) = self.registry.remove(name).await else {
            debug!(connection = %name, "Remove of unknown connection ignored");
            return Ok(false);
        };
        self.connect_locks.lock().await.remove(name);

        if let Some(handle) = handle {
            handle
                .driver
                .disconnect()
                .await
                .map_err(|e| DbError::disconnect(name, e.to_string()))?;
        }
        info!(connection = %name, "Connection removed");
        Ok(true)
    }

    /// Retry one connection with its stored config.
    pub async fn retry_connection(&self, name: &str) -> DbResult<RetryOutcome> {
        let status = match self.registry.status(name).await {
            Some(status) => status,
            None => return Err(self.unknown_connection(name).await),
        };
        if status.connected {
            return Ok(RetryOutcome::AlreadyConnected);
        }
        Ok(match self.attempt(status.config).await {
            Ok(_) => RetryOutcome::Reconnected,
            Err(e) => RetryOutcome::Failed {
                error: e.to_string(),
            },
        })
    }

    /// Retry `target`, or every not-connected entry concurrently when no
    /// target is given. Connected entries are left untouched.
    pub async fn retry_failed(&self, target: Option<&str>) -> DbResult<RetryReport> {
        let mut report = RetryReport::default();

        let names = match target {
            Some(name) => vec![name.to_string()],
            None => self
                .registry
                .snapshot()
                .await
                .into_iter()
                .filter(|s| !s.connected)
                .map(|s| s.config.name.clone())
                .collect(),
        };

        let outcomes = join_all(names.iter().map(|name| self.retry_connection(name))).await;
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                // a targeted unknown name is a hard error
                Err(e) if target.is_some() => return Err(e),
                // removed between snapshot and retry
                Err(_) => continue,
            };
            match &outcome {
                RetryOutcome::AlreadyConnected => {}
                RetryOutcome::Reconnected => {
                    report.attempted += 1;
                    report.succeeded += 1;
                }
                RetryOutcome::Failed { error } => {
                    report.attempted += 1;
                    report.failed.push(FailedConnection {
                        name: name.clone(),
                        error: error.clone(),
                    });
                }
            }
            report.outcomes.insert(name, outcome);
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "Retry finished"
        );
        Ok(report)
    }

    /// Empty the registry and disconnect every live handle concurrently.
    /// Failures are collected, never propagated.
    pub async fn disconnect_all(&self) -> ShutdownReport {
        let handles = self.registry.drain().await;
        let results = join_all(handles.into_iter().map(|(name, handle)| async move {
            let result = handle.driver.disconnect().await;
            (name, result)
        }))
        .await;

        let mut report = ShutdownReport::default();
        for (name, result) in results {
            match result {
                Ok(()) => report.disconnected.push(name),
                Err(e) => {
                    warn!(connection = %name, error = %e, "Disconnect failed during shutdown");
                    report.failures.push(FailedConnection {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            disconnected = report.disconnected.len(),
            failures = report.failures.len(),
            "All connections closed"
        );
        report
    }

    /// Live handle for `name`, connecting lazily with the stored config.
    ///
    /// Concurrent callers for the same name wait on one attempt and share its
    /// handle. If the attempt loses to a newer one (a concurrent replace or
    /// retry), the newer live handle is returned instead.
    pub async fn get_or_connect(&self, name: &str) -> DbResult<DriverHandle> {
        if let Some(handle) = self.registry.handle(name).await {
            return Ok(handle);
        }

        let lock = self.connect_lock(name).await;
        let _guard = lock.lock().await;
        if let Some(handle) = self.registry.handle(name).await {
            return Ok(handle);
        }
        let Some(config) = self.registry.config(name).await else {
            return Err(self.unknown_connection(name).await);
        };
        match self.attempt(config).await {
            Ok(handle) => Ok(handle),
            Err(e) => match self.registry.handle(name).await {
                Some(handle) => {
                    debug!(connection = %name, error = %e, "Using connection from a newer attempt");
                    Ok(handle)
                }
                None => Err(e),
            },
        }
    }

    pub async fn snapshot(&self) -> Vec<ConnectionStatus> {
        self.registry.snapshot().await
    }

    pub async fn status(&self, name: &str) -> Option<ConnectionStatus> {
        self.registry.status(name).await
    }

    pub async fn names(&self) -> Vec<String> {
        self.registry.names().await
    }

    pub async fn active_names(&self) -> Vec<String> {
        self.registry.active_names().await
    }

    /// `UnknownConnection` listing every configured name.
    pub async fn unknown_connection(&self, name: &str) -> DbError {
        DbError::unknown_connection(name, self.registry.names().await)
    }

    async fn connect_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.connect_locks
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    async fn attempt(&self, config: Arc<ConnectionConfig>) -> DbResult<DriverHandle> {
        let name = config.name.clone();
        let (ticket, previous) = self.registry.upsert_attempt_start(config.clone()).await;
        if let Some(previous) = previous {
            debug!(connection = %name, "Disconnecting replaced connection");
            self.release(&name, previous).await;
        }

        debug!(connection = %name, kind = %config.kind, url = %config.masked_url(), "Connecting");
        let connected = match self.factory.create(&config) {
            Ok(handle) => match handle.driver.connect().await {
                Ok(()) => Ok(handle),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match connected {
            Ok(handle) => match self.registry.record_success(&ticket, handle.clone()).await {
                None => {
                    info!(
                        connection = %name,
                        catalog = handle.supports_catalog(),
                        "Connection established"
                    );
                    Ok(handle)
                }
                Some(stale) => {
                    self.release(&name, stale).await;
                    Err(DbError::connection(
                        format!("Connection attempt for '{}' was superseded", name),
                        "The connection was replaced or removed while connecting",
                    ))
                }
            },
            Err(e) => {
                warn!(
                    connection = %name,
                    url = %config.masked_url(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Connection attempt failed"
                );
                if let Some(stray) = self.registry.record_failure(&ticket, e.to_string()).await {
                    self.release(&name, stray).await;
                }
                Err(e)
            }
        }
    }

    async fn release(&self, name: &str, handle: DriverHandle) {
        if let Err(e) = handle.driver.disconnect().await {
            warn!(connection = %name, error = %e, "Failed to disconnect released handle");
        }
    }

    async fn status_after(
        &self,
        config: Arc<ConnectionConfig>,
        error: Option<DbError>,
    ) -> ConnectionStatus {
        match self.registry.status(&config.name).await {
            Some(status) => status,
            // removed while the attempt was running
            None => ConnectionStatus {
                connected: false,
                error: error.map(|e| e.to_string()),
                last_attempt: Some(chrono::Utc::now()),
                config,
            },
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::with_sqlx()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
