//! Query execution.
//!
//! - Row limits are enforced while streaming: at most `limit + 1` rows are
//!   fetched, the extra one only marks the result as truncated.
//! - Every statement runs under a timeout.
//! - Statements without parameters go through the raw (unprepared) path so
//!   that multi-statement scripts and DDL that cannot be prepared still work.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::dispatch_backend;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryRequest, QueryResult, WriteResult, WriteStatement};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Run a row-returning statement.
pub async fn fetch(pool: &DbPool, request: &QueryRequest) -> DbResult<QueryResult> {
    let start = Instant::now();
    let limit = request.effective_limit() as usize;
    let query_timeout = Duration::from_secs(request.effective_timeout() as u64);

    debug!(
        params = request.params.len(),
        limit,
        timeout_secs = query_timeout.as_secs(),
        "Executing query"
    );

    dispatch_backend!(pool, |p, backend| {
        let rows = backend::fetch_rows(p, &request.sql, &request.params, limit + 1, query_timeout)
            .await?;
        Ok(into_result(rows, limit, start, request.decode_binary))
    })
}

/// Run one INSERT/UPDATE/DELETE/DDL statement.
pub async fn execute(
    pool: &DbPool,
    sql: &str,
    params: &[QueryParam],
    query_timeout: Duration,
) -> DbResult<WriteResult> {
    debug!(
        params = params.len(),
        timeout_secs = query_timeout.as_secs(),
        "Executing write"
    );
    dispatch_backend!(pool, |p, backend| backend::execute(p, sql, params, query_timeout).await)
}

/// Run statements in one transaction. The first failure rolls everything back
/// and is reported with its statement index.
pub async fn execute_transaction(
    pool: &DbPool,
    statements: &[WriteStatement],
    query_timeout: Duration,
) -> DbResult<Vec<WriteResult>> {
    if statements.is_empty() {
        return Err(DbError::invalid_input("Transaction requires at least one statement"));
    }
    debug!(
        statements = statements.len(),
        timeout_secs = query_timeout.as_secs(),
        "Executing transaction"
    );
    dispatch_backend!(pool, |p, backend| {
        backend::execute_transaction(p, statements, query_timeout).await
    })
}

fn into_result<R: RowToJson>(
    rows: Vec<R>,
    limit: usize,
    start: Instant,
    decode_binary: bool,
) -> QueryResult {
    let columns = rows.first().map(|r| r.column_metadata()).unwrap_or_default();
    let truncated = rows.len() > limit;
    let json_rows = rows
        .iter()
        .take(limit)
        .map(|r| r.to_json_map(decode_binary))
        .collect::<Vec<_>>();

    if truncated {
        warn!(limit, "Query result truncated");
    }
    QueryResult::new(
        columns,
        json_rows,
        truncated,
        start.elapsed().as_millis() as u64,
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn statement_failed(index: usize, err: DbError) -> DbError {
    match err {
        DbError::Database {
            message,
            sql_state,
            suggestion,
        } => DbError::database(
            format!("Statement {} failed, transaction rolled back: {}", index + 1, message),
            sql_state,
            suggestion,
        ),
        other => other,
    }
}

/// Generates the per-backend module. `$last_id` extracts the generated key
/// from the backend's query result, if the backend reports one.
macro_rules! backend_module {
    ($name:ident, $db:ty, |$res:ident| $last_id:expr) => {
        pub(super) mod $name {
            use super::*;
            use futures_util::{StreamExt, TryStreamExt};
            use sqlx::{Database, Executor};
            use tokio::time::timeout;

            type Db = $db;
            type Pool = sqlx::Pool<Db>;
            type Query<'q> = sqlx::query::Query<'q, Db, <Db as Database>::Arguments<'q>>;

            pub async fn fetch_rows(
                pool: &Pool,
                sql: &str,
                params: &[QueryParam],
                fetch_limit: usize,
                query_timeout: Duration,
            ) -> DbResult<Vec<<Db as Database>::Row>> {
                let stream = if params.is_empty() {
                    pool.fetch(sql)
                } else {
                    bind_all(sqlx::query(sql), params).fetch(pool)
                };
                match timeout(query_timeout, stream.take(fetch_limit).try_collect::<Vec<_>>()).await
                {
                    Ok(rows) => Ok(rows?),
                    Err(_) => Err(DbError::timeout("query execution", query_timeout.as_secs())),
                }
            }

            pub async fn execute(
                pool: &Pool,
                sql: &str,
                params: &[QueryParam],
                query_timeout: Duration,
            ) -> DbResult<WriteResult> {
                let start = Instant::now();
                let outcome = if params.is_empty() {
                    timeout(query_timeout, pool.execute(sql)).await
                } else {
                    timeout(query_timeout, bind_all(sqlx::query(sql), params).execute(pool)).await
                };
                match outcome {
                    Ok(result) => Ok(write_result(&result?, start)),
                    Err(_) => Err(DbError::timeout("write operation", query_timeout.as_secs())),
                }
            }

            pub async fn execute_transaction(
                pool: &Pool,
                statements: &[WriteStatement],
                query_timeout: Duration,
            ) -> DbResult<Vec<WriteResult>> {
                let mut tx = pool.begin().await?;
                let mut results = Vec::with_capacity(statements.len());

                for (index, statement) in statements.iter().enumerate() {
                    let start = Instant::now();
                    let outcome = if statement.params.is_empty() {
                        timeout(query_timeout, (&mut *tx).execute(statement.sql.as_str())).await
                    } else {
                        let query = bind_all(sqlx::query(&statement.sql), &statement.params);
                        timeout(query_timeout, query.execute(&mut *tx)).await
                    };

                    let failure = match outcome {
                        Ok(Ok(result)) => {
                            results.push(write_result(&result, start));
                            continue;
                        }
                        Ok(Err(e)) => statement_failed(index, e.into()),
                        Err(_) => DbError::timeout(
                            format!("transaction statement {}", index + 1),
                            query_timeout.as_secs(),
                        ),
                    };
                    if let Err(e) = tx.rollback().await {
                        warn!(error = %e, "Rollback failed");
                    }
                    return Err(failure);
                }

                tx.commit().await?;
                Ok(results)
            }

            fn write_result(
                $res: &<Db as Database>::QueryResult,
                start: Instant,
            ) -> WriteResult {
                WriteResult {
                    rows_affected: $res.rows_affected(),
                    last_insert_id: $last_id,
                    execution_time_ms: elapsed_ms(start),
                }
            }

            fn bind_all<'q>(mut query: Query<'q>, params: &'q [QueryParam]) -> Query<'q> {
                for param in params {
                    query = match param {
                        QueryParam::Null => query.bind(None::<String>),
                        QueryParam::Bool(v) => query.bind(*v),
                        QueryParam::Int(v) => query.bind(*v),
                        QueryParam::Float(v) => query.bind(*v),
                        QueryParam::String(v) => query.bind(v.as_str()),
                    };
                }
                query
            }
        }
    };
}

backend_module!(mysql, sqlx::MySql, |result| i64::try_from(result.last_insert_id())
    .ok()
    .filter(|id| *id > 0));
backend_module!(postgres, sqlx::Postgres, |_result| None);
backend_module!(sqlite, sqlx::Sqlite, |result| Some(result.last_insert_rowid())
    .filter(|id| *id > 0));
