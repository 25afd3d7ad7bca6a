//! Schema and catalog introspection for SQLite, PostgreSQL and MySQL.
//!
//! SQL lives in the `queries` submodule; each backend submodule exposes the
//! same three functions so [`dispatch_backend!`](crate::dispatch_backend) can
//! route to them.

use crate::db::pool::DbPool;
use crate::dispatch_backend;
use crate::error::{DbError, DbResult};
use crate::models::{CatalogEntry, ColumnDefinition, TableInfo, TableSchema, TableType};
use sqlx::Row;
use tracing::debug;

pub async fn list_tables(
    pool: &DbPool,
    schema: Option<&str>,
    include_views: bool,
) -> DbResult<Vec<TableInfo>> {
    dispatch_backend!(pool, |p, backend| backend::list_tables(p, schema, include_views).await)
}

pub async fn describe_table(
    pool: &DbPool,
    table_name: &str,
    schema: Option<&str>,
) -> DbResult<TableSchema> {
    if table_name.trim().is_empty() {
        return Err(DbError::invalid_input("Table name cannot be empty"));
    }
    let described =
        dispatch_backend!(pool, |p, backend| backend::describe_table(p, table_name, schema).await)?;
    if described.columns.is_empty() {
        return Err(DbError::schema(
            format!("Table '{}' not found", table_name),
            table_name,
        ));
    }
    Ok(described)
}

/// Databases visible on the server. SQLite has no server catalog.
pub async fn list_databases(pool: &DbPool) -> DbResult<Vec<CatalogEntry>> {
    dispatch_backend!(pool, |p, backend| backend::list_databases(p).await)
}

mod queries {
    pub mod postgres {
        pub const LIST_DATABASES: &str = r#"
            SELECT
                datname::text AS name,
                pg_database_size(datname) AS size_bytes,
                pg_catalog.pg_get_userbyid(datdba)::text AS owner,
                pg_encoding_to_char(encoding)::text AS encoding
            FROM pg_database
            WHERE datistemplate = false AND datallowconn
            ORDER BY datname
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                t.table_name::text AS table_name,
                t.table_type::text AS table_type,
                s.n_live_tup AS row_count,
                obj_description(format('%I.%I', t.table_schema, t.table_name)::regclass) AS comment
            FROM information_schema.tables t
            LEFT JOIN pg_stat_user_tables s
                ON s.schemaname = t.table_schema AND s.relname = t.table_name
            WHERE t.table_schema = $1
              AND (t.table_type = 'BASE TABLE' OR ($2 AND t.table_type = 'VIEW'))
            ORDER BY t.table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                c.column_name::text AS column_name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                c.is_nullable::text AS is_nullable,
                c.column_default::text AS column_default,
                COALESCE(i.indisprimary, false) AS is_pk
            FROM information_schema.columns c
            JOIN pg_attribute a
                ON a.attrelid = format('%I.%I', c.table_schema, c.table_name)::regclass
               AND a.attname = c.column_name
            LEFT JOIN pg_index i
                ON i.indrelid = a.attrelid AND i.indisprimary AND a.attnum = ANY(i.indkey)
            WHERE c.table_name = $1 AND c.table_schema = $2
            ORDER BY c.ordinal_position
            "#;
    }

    pub mod mysql {
        pub const LIST_DATABASES: &str = r#"
            SELECT
                s.SCHEMA_NAME AS name,
                s.DEFAULT_CHARACTER_SET_NAME AS encoding,
                CAST(SUM(t.DATA_LENGTH + t.INDEX_LENGTH) AS UNSIGNED) AS size_bytes
            FROM information_schema.SCHEMATA s
            LEFT JOIN information_schema.TABLES t ON t.TABLE_SCHEMA = s.SCHEMA_NAME
            GROUP BY s.SCHEMA_NAME, s.DEFAULT_CHARACTER_SET_NAME
            ORDER BY s.SCHEMA_NAME
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                TABLE_NAME AS table_name,
                TABLE_SCHEMA AS table_schema,
                TABLE_TYPE AS table_type,
                TABLE_ROWS AS row_count,
                TABLE_COMMENT AS comment
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
              AND (TABLE_TYPE = 'BASE TABLE' OR (? AND TABLE_TYPE = 'VIEW'))
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                COLUMN_NAME AS column_name,
                COLUMN_TYPE AS data_type,
                IS_NULLABLE AS is_nullable,
                COLUMN_DEFAULT AS column_default,
                COLUMN_KEY AS column_key,
                TABLE_SCHEMA AS table_schema
            FROM information_schema.COLUMNS
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
            ORDER BY ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE (type = 'table' OR (? AND type = 'view'))
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const DESCRIBE_COLUMNS: &str =
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid";
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;

    pub async fn list_tables(
        pool: &PgPool,
        schema: Option<&str>,
        include_views: bool,
    ) -> DbResult<Vec<TableInfo>> {
        let schema_name = schema.unwrap_or("public");
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema_name)
            .bind(include_views)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("table_name").unwrap_or_default();
                let kind: String = row.try_get("table_type").unwrap_or_default();
                let mut table = TableInfo::new(name, TableType::parse(&kind)).with_schema(schema_name);
                if let Ok(Some(count)) = row.try_get::<Option<i64>, _>("row_count") {
                    table = table.with_row_count(count.max(0) as u64);
                }
                if let Ok(Some(comment)) = row.try_get::<Option<String>, _>("comment") {
                    table = table.with_comment(comment);
                }
                table
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), schema = schema_name, "Listed PostgreSQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &PgPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> DbResult<TableSchema> {
        let schema_name = schema.unwrap_or("public");
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().fold(
            TableSchema::new(table_name).with_schema(Some(schema_name.to_string())),
            |table, row| {
                let nullable: String = row.try_get("is_nullable").unwrap_or_default();
                let column = ColumnDefinition::new(
                    row.try_get::<String, _>("column_name").unwrap_or_default(),
                    row.try_get::<String, _>("data_type").unwrap_or_default(),
                    nullable.eq_ignore_ascii_case("YES"),
                )
                .with_default(
                    row.try_get::<Option<String>, _>("column_default")
                        .ok()
                        .flatten(),
                )
                .with_primary_key(row.try_get("is_pk").unwrap_or(false));
                table.with_column(column)
            },
        ))
    }

    pub async fn list_databases(pool: &PgPool) -> DbResult<Vec<CatalogEntry>> {
        let rows = sqlx::query(queries::postgres::LIST_DATABASES)
            .fetch_all(pool)
            .await
            .map_err(|e| DbError::catalog(e.to_string()))?;

        let databases = rows
            .iter()
            .map(|row| {
                let mut entry = CatalogEntry::new(row.try_get::<String, _>("name").unwrap_or_default());
                if let Ok(size) = row.try_get::<i64, _>("size_bytes") {
                    entry = entry.with_size(size.max(0) as u64);
                }
                if let Ok(Some(owner)) = row.try_get::<Option<String>, _>("owner") {
                    entry = entry.with_owner(owner);
                }
                if let Ok(Some(encoding)) = row.try_get::<Option<String>, _>("encoding") {
                    entry = entry.with_encoding(encoding);
                }
                entry
            })
            .collect::<Vec<_>>();

        debug!(count = databases.len(), "Listed PostgreSQL databases");
        Ok(databases)
    }
}

mod mysql {
    use super::*;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    /// information_schema columns come back as VARBINARY on some servers.
    fn text(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    fn unsigned(row: &MySqlRow, column: &str) -> Option<u64> {
        row.try_get::<Option<u64>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<i64>, _>(column)
                    .ok()
                    .flatten()
                    .map(|v| v.max(0) as u64)
            })
    }

    pub async fn list_tables(
        pool: &MySqlPool,
        schema: Option<&str>,
        include_views: bool,
    ) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .bind(include_views)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = text(row, "table_name")?;
                let kind = text(row, "table_type").unwrap_or_default();
                let mut table = TableInfo::new(name, TableType::parse(&kind));
                if let Some(schema) = text(row, "table_schema") {
                    table = table.with_schema(schema);
                }
                if let Some(count) = unsigned(row, "row_count") {
                    table = table.with_row_count(count);
                }
                if let Some(comment) = text(row, "comment").filter(|c| !c.is_empty()) {
                    table = table.with_comment(comment);
                }
                Some(table)
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> DbResult<TableSchema> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        let schema_name = rows
            .first()
            .and_then(|row| text(row, "table_schema"))
            .or_else(|| schema.map(String::from));

        Ok(rows.iter().fold(
            TableSchema::new(table_name).with_schema(schema_name),
            |table, row| {
                let column = ColumnDefinition::new(
                    text(row, "column_name").unwrap_or_default(),
                    text(row, "data_type").unwrap_or_default(),
                    text(row, "is_nullable").is_some_and(|v| v.eq_ignore_ascii_case("YES")),
                )
                .with_default(text(row, "column_default"))
                .with_primary_key(text(row, "column_key").as_deref() == Some("PRI"));
                table.with_column(column)
            },
        ))
    }

    pub async fn list_databases(pool: &MySqlPool) -> DbResult<Vec<CatalogEntry>> {
        let rows = sqlx::query(queries::mysql::LIST_DATABASES)
            .fetch_all(pool)
            .await
            .map_err(|e| DbError::catalog(e.to_string()))?;

        let databases = rows
            .iter()
            .filter_map(|row| {
                let mut entry = CatalogEntry::new(text(row, "name")?);
                if let Some(size) = unsigned(row, "size_bytes") {
                    entry = entry.with_size(size);
                }
                if let Some(encoding) = text(row, "encoding") {
                    entry = entry.with_encoding(encoding);
                }
                Some(entry)
            })
            .collect::<Vec<_>>();

        debug!(count = databases.len(), "Listed MySQL databases");
        Ok(databases)
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;

    pub async fn list_tables(
        pool: &SqlitePool,
        _schema: Option<&str>,
        include_views: bool,
    ) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .bind(include_views)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("name").unwrap_or_default();
                let kind: String = row.try_get("type").unwrap_or_default();
                TableInfo::new(name, TableType::parse(&kind))
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &SqlitePool,
        table_name: &str,
        _schema: Option<&str>,
    ) -> DbResult<TableSchema> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().fold(TableSchema::new(table_name), |table, row| {
            let not_null: i64 = row.try_get("notnull").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            let column = ColumnDefinition::new(
                row.try_get::<String, _>("name").unwrap_or_default(),
                row.try_get::<String, _>("type").unwrap_or_default(),
                not_null == 0,
            )
            .with_default(row.try_get::<Option<String>, _>("dflt_value").ok().flatten())
            .with_primary_key(pk > 0);
            table.with_column(column)
        }))
    }

    pub async fn list_databases(_pool: &SqlitePool) -> DbResult<Vec<CatalogEntry>> {
        Err(DbError::catalog(
            "SQLite is file-based; each file is a single database",
        ))
    }
}
