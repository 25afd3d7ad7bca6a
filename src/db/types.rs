//! Row decoding into JSON.
//!
//! Column types are first classified into a [`TypeCategory`]; a per-backend
//! decoder then extracts the value with the Rust type sqlx accepts for it.

use crate::models::{ColumnMetadata, DatabaseType};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Temporal,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, kind: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // NUMERIC overlaps with the float checks below
    if lower.contains("decimal") || lower.contains("numeric") {
        if kind == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }
    if (lower.contains("int") && !lower.contains("interval") && !lower.contains("point"))
        || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    if lower.starts_with("timestamp") || lower == "datetime" || lower == "date" || lower == "time"
    {
        return TypeCategory::Temporal;
    }
    TypeCategory::Text
}

/// Exact DECIMAL/NUMERIC text, avoiding float rounding.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<&str as Decode<sqlx::MySql>>::decode(value)?.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("numeric")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<&str as Decode<sqlx::Postgres>>::decode(value)?.to_string()))
    }
}

/// Render binary data as UTF-8 text (when requested and valid) or base64.
pub fn decode_binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) if decode_binary => JsonValue::String(s.to_string()),
        _ => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Conversion of a backend row into JSON plus column metadata.
pub trait RowToJson {
    fn to_json_map(&self, decode_binary: bool) -> serde_json::Map<String, JsonValue>;
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

/// First `try_get` that yields a non-null value, converted with `$map`.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $map:expr, $($ty:ty),+ $(,)?) => {{
        let mut value = JsonValue::Null;
        $(
            if value.is_null() {
                if let Ok(Some(v)) = $row.try_get::<Option<$ty>, _>($idx) {
                    value = $map(v);
                }
            }
        )+
        value
    }};
}

macro_rules! impl_row_to_json {
    ($row_ty:ty, $kind:expr, $decoder:path) => {
        impl RowToJson for $row_ty {
            fn to_json_map(&self, decode_binary: bool) -> serde_json::Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .map(|col| {
                        let category = categorize_type(col.type_info().name(), $kind);
                        let value = $decoder(self, col.ordinal(), category, decode_binary);
                        (col.name().to_string(), value)
                    })
                    .collect()
            }

            fn column_metadata(&self) -> Vec<ColumnMetadata> {
                self.columns()
                    .iter()
                    .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, decode_mysql);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, decode_postgres);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, decode_sqlite);

fn number(v: impl Into<JsonValue>) -> JsonValue {
    v.into()
}

fn text(v: impl ToString) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn float(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn json_text(v: String) -> JsonValue {
    serde_json::from_str(&v).unwrap_or(JsonValue::String(v))
}

fn decode_mysql(row: &MySqlRow, idx: usize, category: TypeCategory, decode_binary: bool) -> JsonValue {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    match category {
        TypeCategory::Integer => {
            first_decoded!(row, idx, number, i64, u64, i32, u32, i16, u16, i8, u8)
        }
        TypeCategory::Float => first_decoded!(row, idx, float, f64),
        TypeCategory::Decimal => first_decoded!(row, idx, |v: RawDecimal| JsonValue::String(v.0), RawDecimal),
        TypeCategory::Boolean => first_decoded!(row, idx, JsonValue::Bool, bool),
        TypeCategory::Binary => {
            first_decoded!(row, idx, |v: Vec<u8>| decode_binary_value(&v, decode_binary), Vec<u8>)
        }
        TypeCategory::Json => first_decoded!(row, idx, |v: JsonValue| v, JsonValue),
        TypeCategory::Temporal => {
            first_decoded!(row, idx, text, NaiveDateTime, NaiveDate, NaiveTime, String)
        }
        TypeCategory::Text => first_decoded!(row, idx, JsonValue::String, String),
    }
}

fn decode_postgres(row: &PgRow, idx: usize, category: TypeCategory, decode_binary: bool) -> JsonValue {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    match category {
        TypeCategory::Integer => first_decoded!(row, idx, number, i64, i32, i16),
        TypeCategory::Float => first_decoded!(row, idx, float, f64),
        TypeCategory::Decimal => first_decoded!(row, idx, |v: RawDecimal| JsonValue::String(v.0), RawDecimal),
        TypeCategory::Boolean => first_decoded!(row, idx, JsonValue::Bool, bool),
        TypeCategory::Binary => {
            first_decoded!(row, idx, |v: Vec<u8>| decode_binary_value(&v, decode_binary), Vec<u8>)
        }
        TypeCategory::Json => first_decoded!(row, idx, |v: JsonValue| v, JsonValue),
        TypeCategory::Temporal => first_decoded!(
            row,
            idx,
            text,
            DateTime<Utc>,
            NaiveDateTime,
            NaiveDate,
            NaiveTime
        ),
        TypeCategory::Text => first_decoded!(row, idx, JsonValue::String, String),
    }
}

fn decode_sqlite(row: &SqliteRow, idx: usize, category: TypeCategory, decode_binary: bool) -> JsonValue {
    match category {
        TypeCategory::Integer => first_decoded!(row, idx, number, i64),
        TypeCategory::Float | TypeCategory::Decimal => first_decoded!(row, idx, float, f64),
        TypeCategory::Boolean => first_decoded!(row, idx, JsonValue::Bool, bool),
        TypeCategory::Binary => {
            first_decoded!(row, idx, |v: Vec<u8>| decode_binary_value(&v, decode_binary), Vec<u8>)
        }
        TypeCategory::Json => first_decoded!(row, idx, json_text, String),
        // SQLite is dynamically typed, so expression columns can hold anything.
        TypeCategory::Temporal | TypeCategory::Text => {
            let value = first_decoded!(row, idx, JsonValue::String, String);
            if value.is_null() {
                first_decoded!(row, idx, number, i64)
            } else {
                value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT", DatabaseType::PostgreSQL), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8", DatabaseType::PostgreSQL), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("DECIMAL", DatabaseType::MySQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC", DatabaseType::PostgreSQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("numeric", DatabaseType::SQLite), TypeCategory::Float);
    }

    #[test]
    fn test_categorize_type_temporal_and_text() {
        assert_eq!(categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL), TypeCategory::Temporal);
        assert_eq!(categorize_type("DATETIME", DatabaseType::MySQL), TypeCategory::Temporal);
        assert_eq!(categorize_type("VARCHAR", DatabaseType::MySQL), TypeCategory::Text);
        assert_eq!(categorize_type("jsonb", DatabaseType::PostgreSQL), TypeCategory::Json);
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(decode_binary_value(b"hello world", true), "hello world");
        assert_eq!(decode_binary_value(b"hello world", false), "aGVsbG8gd29ybGQ=");
        assert_eq!(decode_binary_value(&[0xFF, 0xFE, 0x00, 0x01], true), "//4AAQ==");
    }
}
