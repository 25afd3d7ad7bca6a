//! Schema and catalog introspection models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One database (or SQLite file) reported by catalog listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Human readable size, e.g. "8.2 MiB"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Encoding (PostgreSQL) or default charset (MySQL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// SQLite only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self.size_formatted = Some(humansize::format_size(size_bytes, humansize::BINARY));
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table_type: TableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table_type,
            row_count: None,
            comment: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    SystemTable,
    TemporaryTable,
}

impl TableType {
    /// Parse the table type strings reported by information_schema and sqlite_master.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "view" => Self::View,
            "materialized view" | "matview" => Self::MaterializedView,
            "system table" | "system view" => Self::SystemTable,
            "local temporary" | "temporary" | "temp" => Self::TemporaryTable,
            _ => Self::Table,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    pub fn with_default(mut self, default_value: Option<String>) -> Self {
        self.default_value = default_value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema_name = schema;
        self
    }

    /// Append a column, tracking it in `primary_key` when flagged.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        if column.is_primary_key {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{}.{}", schema, self.table_name),
            None => self.table_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_type_parse() {
        assert_eq!(TableType::parse("BASE TABLE"), TableType::Table);
        assert_eq!(TableType::parse("VIEW"), TableType::View);
        assert_eq!(TableType::parse("matview"), TableType::MaterializedView);
        assert_eq!(TableType::parse("whatever"), TableType::Table);
    }

    #[test]
    fn test_table_schema_tracks_primary_key() {
        let schema = TableSchema::new("users")
            .with_schema(Some("public".into()))
            .with_column(ColumnDefinition::new("id", "integer", false).with_primary_key(true))
            .with_column(ColumnDefinition::new("email", "text", true));

        assert_eq!(schema.primary_key, vec!["id".to_string()]);
        assert_eq!(schema.qualified_name(), "public.users");
    }

    #[test]
    fn test_catalog_entry_formats_size() {
        let entry = CatalogEntry::new("app").with_size(2048);
        assert_eq!(entry.size_bytes, Some(2048));
        assert_eq!(entry.size_formatted.as_deref(), Some("2 KiB"));
    }

    #[test]
    fn test_catalog_entry_skips_empty_fields() {
        let json = serde_json::to_value(CatalogEntry::new("postgres")).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "postgres" }));
    }
}
