//! Schema Catalog
//!
//! Read-only snapshot of tables, columns, types and key edges, supplied by the
//! external exporter. Names are matched case-insensitively.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(default, alias = "type")]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

impl Table {
    pub fn new(name: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(name, ty)| ColumnMetadata {
                    name: name.to_string(),
                    data_type: Some(ty.to_string()),
                })
                .collect(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_foreign_key(mut self, column: &str, ref_table: &str, ref_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_column.to_string(),
        });
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

impl SchemaCatalog {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    /// Load an exporter snapshot (`{"tables": [...]}`) from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table).map(|t| t.has_column(column)).unwrap_or(false)
    }

    /// Whether the column's declared type is a date/time type.
    pub fn is_temporal(&self, table: &str, column: &str) -> bool {
        self.table(table)
            .and_then(|t| t.column(column))
            .and_then(|c| c.data_type.as_deref())
            .map(is_temporal_type)
            .unwrap_or(false)
    }
}

pub fn is_temporal_type(data_type: &str) -> bool {
    let ty = data_type.trim().to_lowercase();
    ty.starts_with("date")
        || ty.starts_with("time")
        || ty.starts_with("year")
        || ty.starts_with("timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_shape_deserializes() {
        let raw = r#"{"tables": [{"name": "Orders", "columns": [
            {"name": "id", "type": "bigint"},
            {"name": "created_at", "type": "DATETIME"}
        ]}]}"#;
        let catalog: SchemaCatalog = serde_json::from_str(raw).unwrap();
        assert!(catalog.has_table("orders"));
        assert!(catalog.has_column("ORDERS", "ID"));
        assert!(catalog.is_temporal("orders", "created_at"));
        assert!(!catalog.is_temporal("orders", "id"));
    }

    #[test]
    fn test_temporal_types() {
        assert!(is_temporal_type("date"));
        assert!(is_temporal_type("TIMESTAMP(3)"));
        assert!(is_temporal_type("datetime"));
        assert!(!is_temporal_type("varchar(32)"));
    }
}
