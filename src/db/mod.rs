//! Database layer.
//!
//! - `driver`: the capability traits the lifecycle manager talks to
//! - `sqlx_driver`, `pool`, `executor`, `schema`, `types`: the sqlx backend
//! - `registry`: name → status/handle map
//! - `manager`: connection lifecycle (add, remove, retry, shutdown)

#[macro_use]
pub mod macros;
pub mod driver;
pub mod executor;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod sqlx_driver;
pub mod types;

pub use driver::{CatalogProvider, DatabaseDriver, DriverFactory, DriverHandle};
pub use manager::{
    ConnectionManager, FailedConnection, InitializeSummary, RetryOutcome, RetryReport,
    ShutdownReport,
};
pub use pool::DbPool;
pub use registry::{Attempt, ConnectionRegistry};
pub use sqlx_driver::{SqlxDriver, SqlxDriverFactory};
