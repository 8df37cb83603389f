//! Table schemas and row decoding.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::notation::Row;

use super::column::ColumnSchema;
use super::{SchemaError, ValueError};

/// A table: a name and its columns, keyed by column name.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: BTreeMap<String, ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        TableSchema {
            name: name.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn from_json(name: impl Into<String>, json: &Value) -> Result<TableSchema, SchemaError> {
        let name = name.into();
        let columns_node = json
            .get("columns")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                SchemaError::parsing(format!("table {name} is missing \"columns\""))
            })?;

        let mut columns = BTreeMap::new();
        for (column_name, column_node) in columns_node {
            let column = ColumnSchema::from_json(column_name.clone(), column_node)?;
            columns.insert(column_name.clone(), column);
        }
        Ok(TableSchema { name, columns })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.values()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names are unique per table; inserting an existing name replaces
    /// the previous schema.
    pub fn add_column(&mut self, column: ColumnSchema) {
        self.columns.insert(column.name().to_string(), column);
    }

    /// Serializes back to the table's schema wire shape.
    pub fn to_json(&self) -> Value {
        let mut columns = serde_json::Map::new();
        for (name, column) in &self.columns {
            columns.insert(name.clone(), column.to_json());
        }
        json!({"columns": columns})
    }

    /// Decodes a wire row object against this table's columns. Columns the
    /// schema does not know are skipped (a server newer than the cached
    /// schema may send them).
    pub fn row_from_json(&self, json: &Value) -> Result<Row, ValueError> {
        let object = json
            .as_object()
            .ok_or_else(|| ValueError::malformed(format!("row is not an object: {json}")))?;

        let mut row = Row::new();
        for (column_name, value_node) in object {
            let Some(column) = self.columns.get(column_name) else {
                tracing::debug!(table = %self.name, column = %column_name, "skipping unknown column");
                continue;
            };
            let value = column.column_type().value_from_json(value_node)?;
            row.insert(column_name.clone(), value);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::{Atom, TypedValue};
    use serde_json::json;

    fn bridge_schema() -> TableSchema {
        TableSchema::from_json(
            "Bridge",
            &json!({
                "columns": {
                    "name": {"type": {"key": "string"}},
                    "fail_mode": {"type": {"key": "string", "min": 0, "max": 1}},
                    "flood_vlans": {"type": {
                        "key": {"type": "integer", "minInteger": 0, "maxInteger": 4095},
                        "min": 0,
                        "max": "unlimited"
                    }}
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn parses_columns() {
        let table = bridge_schema();
        assert_eq!(table.name(), "Bridge");
        assert!(table.column("name").is_some());
        assert!(table.column("flood_vlans").is_some());
        assert!(table.column("bogus").is_none());
    }

    #[test]
    fn missing_columns_member_is_parse_error() {
        let err = TableSchema::from_json("Broken", &json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::Parsing { .. }));
    }

    #[test]
    fn decodes_row_and_skips_unknown_columns() {
        let table = bridge_schema();
        let row = table
            .row_from_json(&json!({
                "name": "br-int",
                "flood_vlans": ["set", [100, 200]],
                "not_in_schema": 1
            }))
            .unwrap();
        assert_eq!(
            row.get("name"),
            Some(&TypedValue::Atom(Atom::from("br-int")))
        );
        assert_eq!(row.get("flood_vlans").unwrap().as_set().unwrap().len(), 2);
        assert!(row.get("not_in_schema").is_none());
    }

    #[test]
    fn row_decode_propagates_value_errors() {
        let table = bridge_schema();
        let err = table
            .row_from_json(&json!({"flood_vlans": {"nested": true}}))
            .unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }
}
