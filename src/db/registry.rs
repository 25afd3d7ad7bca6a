//! Authoritative name → (config, live handle, status) map.
//!
//! Every mutation happens under one `tokio::sync::RwLock` and never spans a
//! driver call. Handles that leave the registry are returned to the caller,
//! which is responsible for disconnecting them outside the lock.

use crate::db::driver::DriverHandle;
use crate::models::{ConnectionConfig, ConnectionStatus};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ticket for one connection attempt. Outcomes recorded with a ticket that
/// is no longer the entry's latest attempt are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub name: String,
    generation: u64,
}

#[derive(Debug)]
struct Entry {
    status: ConnectionStatus,
    /// Present only while `status.connected`
    handle: Option<DriverHandle>,
    generation: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<String, Entry>,
    next_generation: u64,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an attempt for `config`: the entry is created or reset to
    /// not-connected with `last_attempt = now`, and any live handle is
    /// detached and returned for the caller to disconnect.
    pub async fn upsert_attempt_start(
        &self,
        config: Arc<ConnectionConfig>,
    ) -> (Attempt, Option<DriverHandle>) {
        let mut state = self.state.write().await;
        state.next_generation += 1;
        let generation = state.next_generation;
        let name = config.name.clone();

        let status = ConnectionStatus {
            config,
            connected: false,
            error: None,
            last_attempt: Some(Utc::now()),
        };

        let previous = match state.entries.get_mut(&name) {
            Some(entry) => {
                entry.status = status;
                entry.generation = generation;
                entry.handle.take()
            }
            None => {
                state.entries.insert(
                    name.clone(),
                    Entry {
                        status,
                        handle: None,
                        generation,
                    },
                );
                None
            }
        };

        (Attempt { name, generation }, previous)
    }

    /// Install a connected handle. Returns the handle back when the attempt
    /// is stale or the entry was removed meanwhile.
    pub async fn record_success(
        &self,
        attempt: &Attempt,
        handle: DriverHandle,
    ) -> Option<DriverHandle> {
        let mut state = self.state.write().await;
        match state.entries.get_mut(&attempt.name) {
            Some(entry) if entry.generation == attempt.generation => {
                entry.status.connected = true;
                entry.status.error = None;
                entry.handle = Some(handle);
                None
            }
            _ => Some(handle),
        }
    }

    /// Mark the attempt as failed. Returns any handle that was live, which
    /// can only happen if the attempt is current and a handle slipped in.
    pub async fn record_failure(
        &self,
        attempt: &Attempt,
        error: impl Into<String>,
    ) -> Option<DriverHandle> {
        let mut state = self.state.write().await;
        match state.entries.get_mut(&attempt.name) {
            Some(entry) if entry.generation == attempt.generation => {
                entry.status.connected = false;
                entry.status.error = Some(error.into());
                entry.handle.take()
            }
            _ => None,
        }
    }

    /// Delete an entry, returning its last status and live handle.
    pub async fn remove(&self, name: &str) -> Option<(ConnectionStatus, Option<DriverHandle>)> {
        let mut state = self.state.write().await;
        state
            .entries
            .remove(name)
            .map(|entry| (entry.status, entry.handle))
    }

    /// Name-ordered point-in-time copy of every status.
    pub async fn snapshot(&self) -> Vec<ConnectionStatus> {
        let state = self.state.read().await;
        state.entries.values().map(|e| e.status.clone()).collect()
    }

    pub async fn status(&self, name: &str) -> Option<ConnectionStatus> {
        let state = self.state.read().await;
        state.entries.get(name).map(|e| e.status.clone())
    }

    pub async fn config(&self, name: &str) -> Option<Arc<ConnectionConfig>> {
        let state = self.state.read().await;
        state.entries.get(name).map(|e| e.status.config.clone())
    }

    /// Live handle for `name`, if connected.
    pub async fn handle(&self, name: &str) -> Option<DriverHandle> {
        let state = self.state.read().await;
        state.entries.get(name).and_then(|e| e.handle.clone())
    }

    /// All configured names, ordered.
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.entries.keys().cloned().collect()
    }

    /// Names with `connected == true`, ordered.
    pub async fn active_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .filter(|(_, e)| e.status.connected)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.entries.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Empty the registry, returning every live handle by name.
    pub async fn drain(&self) -> Vec<(String, DriverHandle)> {
        let mut state = self.state.write().await;
        std::mem::take(&mut state.entries)
            .into_iter()
            .filter_map(|(name, entry)| entry.handle.map(|h| (name, h)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::DatabaseDriver;
    use crate::error::DbResult;
    use crate::models::{
        DatabaseType, QueryParam, QueryRequest, QueryResult, TableInfo, TableSchema, WriteResult,
        WriteStatement,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullDriver;

    #[async_trait]
    impl DatabaseDriver for NullDriver {
        fn kind(&self) -> DatabaseType {
            DatabaseType::SQLite
        }
        async fn connect(&self) -> DbResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> DbResult<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn execute_query(&self, _: &QueryRequest) -> DbResult<QueryResult> {
            unimplemented!()
        }
        async fn execute_write(
            &self,
            _: &str,
            _: &[QueryParam],
            _: Duration,
        ) -> DbResult<WriteResult> {
            unimplemented!()
        }
        async fn execute_transaction(
            &self,
            _: &[WriteStatement],
            _: Duration,
        ) -> DbResult<Vec<WriteResult>> {
            unimplemented!()
        }
        async fn list_tables(&self, _: Option<&str>, _: bool) -> DbResult<Vec<TableInfo>> {
            unimplemented!()
        }
        async fn describe_table(&self, _: &str, _: Option<&str>) -> DbResult<TableSchema> {
            unimplemented!()
        }
    }

    fn handle() -> DriverHandle {
        DriverHandle::new(Arc::new(NullDriver))
    }

    fn config(name: &str) -> Arc<ConnectionConfig> {
        Arc::new(ConnectionConfig::sqlite(name, format!("{}.db", name)))
    }

    #[tokio::test]
    async fn test_attempt_start_creates_unconnected_entry() {
        let registry = ConnectionRegistry::new();
        let (attempt, previous) = registry.upsert_attempt_start(config("a")).await;
        assert!(previous.is_none());
        assert_eq!(attempt.name, "a");

        let status = registry.status("a").await.unwrap();
        assert!(!status.connected);
        assert!(status.error.is_none());
        assert!(status.last_attempt.is_some());
        assert!(registry.handle("a").await.is_none());
    }

    #[tokio::test]
    async fn test_success_installs_handle() {
        let registry = ConnectionRegistry::new();
        let (attempt, _) = registry.upsert_attempt_start(config("a")).await;
        assert!(registry.record_success(&attempt, handle()).await.is_none());

        assert!(registry.status("a").await.unwrap().connected);
        assert!(registry.handle("a").await.is_some());
        assert_eq!(registry.active_names().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_restart_detaches_previous_handle() {
        let registry = ConnectionRegistry::new();
        let (attempt, _) = registry.upsert_attempt_start(config("a")).await;
        registry.record_success(&attempt, handle()).await;

        let (_, previous) = registry.upsert_attempt_start(config("a")).await;
        assert!(previous.is_some());
        assert!(registry.handle("a").await.is_none());
        assert!(!registry.status("a").await.unwrap().connected);
    }

    #[tokio::test]
    async fn test_stale_success_is_handed_back() {
        let registry = ConnectionRegistry::new();
        let (first, _) = registry.upsert_attempt_start(config("a")).await;
        let (second, _) = registry.upsert_attempt_start(config("a")).await;

        registry.record_failure(&second, "refused").await;
        let returned = registry.record_success(&first, handle()).await;
        assert!(returned.is_some());

        let status = registry.status("a").await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.error.as_deref(), Some("refused"));
    }

    #[tokio::test]
    async fn test_success_after_remove_is_handed_back() {
        let registry = ConnectionRegistry::new();
        let (attempt, _) = registry.upsert_attempt_start(config("a")).await;
        registry.remove("a").await;

        assert!(registry.record_success(&attempt, handle()).await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_name_ordered() {
        let registry = ConnectionRegistry::new();
        for name in ["c", "a", "b"] {
            registry.upsert_attempt_start(config(name)).await;
        }
        let names: Vec<_> = registry
            .snapshot()
            .await
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_drain_returns_only_live_handles() {
        let registry = ConnectionRegistry::new();
        let (a, _) = registry.upsert_attempt_start(config("a")).await;
        let (b, _) = registry.upsert_attempt_start(config("b")).await;
        registry.record_success(&a, handle()).await;
        registry.record_failure(&b, "nope").await;

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "a");
        assert!(registry.is_empty().await);
    }
}
