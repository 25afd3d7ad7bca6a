//! Backend dispatch macro.
//!
//! Modules that talk to sqlx (`executor`, `schema`) keep one submodule per
//! backend named `mysql`, `postgres` and `sqlite`, each exposing the same
//! functions. `dispatch_backend!` matches a [`DbPool`](crate::db::pool::DbPool)
//! and brings the matching submodule into scope under a caller-chosen alias.
//!
//! ```ignore
//! dispatch_backend!(pool, |p, backend| backend::list_tables(p, schema).await)
//! ```

#[macro_export]
macro_rules! dispatch_backend {
    ($pool:expr, |$p:ident, $backend:ident| $body:expr) => {
        match $pool {
            $crate::db::pool::DbPool::MySql($p) => {
                use self::mysql as $backend;
                $body
            }
            $crate::db::pool::DbPool::Postgres($p) => {
                use self::postgres as $backend;
                $body
            }
            $crate::db::pool::DbPool::SQLite($p) => {
                use self::sqlite as $backend;
                $body
            }
        }
    };
}

pub use dispatch_backend;
