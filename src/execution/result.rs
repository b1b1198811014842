//! Query Rows - result shape returned by an executor

use serde::{Deserialize, Serialize};

/// Rows returned for one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names in projection order
    pub columns: Vec<String>,

    /// One JSON value per column per row
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Execution time in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl QueryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// No rows; what the fallback statement yields on any schema.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let records: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_json_keys_by_column() {
        let rows = QueryRows::new(
            vec!["id".to_string(), "status".to_string()],
            vec![vec![json!(1), json!("paid")], vec![json!(2), json!("open")]],
        );
        assert_eq!(rows.row_count(), 2);
        assert_eq!(
            rows.to_json(),
            json!([{"id": 1, "status": "paid"}, {"id": 2, "status": "open"}])
        );
        assert!(QueryRows::empty().is_empty());
    }
}
