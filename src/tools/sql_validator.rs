//! Read-only enforcement for the `query` tool.
//!
//! Statements are parsed with [sqlparser](https://docs.rs/sqlparser/) in the
//! connection's dialect, so comments, casing and formatting cannot hide a
//! write behind a SELECT-looking prefix.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementClass {
    /// SELECT, SHOW, EXPLAIN of a read
    Read,
    /// INSERT, UPDATE, DELETE, MERGE, COPY
    Write,
    /// CREATE, ALTER, DROP, TRUNCATE
    SchemaChange,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT
    Transaction,
    Other,
}

impl StatementClass {
    fn rejection(self) -> &'static str {
        match self {
            Self::Read => "",
            Self::Write => "Write operations are not allowed in query. Use execute on a writable connection.",
            Self::SchemaChange => {
                "Schema changes are not allowed in query. Use execute on a writable connection."
            }
            Self::Transaction => {
                "Transaction control is not allowed in query. Use execute_transaction to run statements atomically."
            }
            Self::Other => "Only SELECT, SHOW and EXPLAIN statements are allowed in query.",
        }
    }
}

fn dialect_for(kind: DatabaseType) -> Box<dyn Dialect> {
    match kind {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

fn parse(sql: &str, kind: DatabaseType) -> DbResult<Vec<Statement>> {
    let statements = Parser::parse_sql(dialect_for(kind).as_ref(), sql)
        .map_err(|e| DbError::invalid_input(format!("Failed to parse SQL: {}", e)))?;
    if statements.is_empty() {
        return Err(DbError::invalid_input("Empty SQL statement"));
    }
    Ok(statements)
}

/// Accept `sql` only if every statement in it is a read.
pub fn validate_readonly(sql: &str, kind: DatabaseType) -> DbResult<()> {
    for statement in parse(sql, kind)? {
        let class = classify(&statement);
        if class != StatementClass::Read {
            return Err(DbError::permission(keyword(&statement), class.rejection()));
        }
    }
    Ok(())
}

/// True when `sql` parses and consists only of reads. Unparseable SQL is
/// left for the database to judge.
pub fn is_readonly(sql: &str, kind: DatabaseType) -> bool {
    parse(sql, kind).is_ok_and(|statements| {
        statements
            .iter()
            .all(|s| classify(s) == StatementClass::Read)
    })
}

pub fn classify(statement: &Statement) -> StatementClass {
    match statement {
        Statement::Query(_)
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ExplainTable { .. } => StatementClass::Read,

        // EXPLAIN ANALYZE runs its statement, so it inherits the inner class.
        Statement::Explain { statement, .. } => classify(statement),

        Statement::Insert { .. }
        | Statement::Update { .. }
        | Statement::Delete { .. }
        | Statement::Merge { .. }
        | Statement::Copy { .. } => StatementClass::Write,

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. } => StatementClass::SchemaChange,

        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => StatementClass::Transaction,

        _ => StatementClass::Other,
    }
}

/// Leading keyword(s) of a statement for error messages, e.g. "INSERT" or
/// "CREATE TABLE".
fn keyword(statement: &Statement) -> String {
    let rendered = statement.to_string();
    let mut words = rendered.split_whitespace().map(str::to_uppercase);
    match words.next() {
        Some(first) if matches!(first.as_str(), "CREATE" | "ALTER" | "DROP") => match words.next() {
            Some(second) => format!("{} {}", first, second),
            None => first,
        },
        Some(first) => first,
        None => "statement".to_string(),
    }
}
