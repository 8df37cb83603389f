//! Database schemas.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::base_type::BaseType;
use super::column::{ColumnSchema, ColumnType};
use super::table::TableSchema;
use super::SchemaError;

/// A parsed database schema: name, advertised version, and tables.
#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseSchema {
    name: String,
    version: Option<String>,
    tables: BTreeMap<String, TableSchema>,
}

impl DatabaseSchema {
    /// Parses a `get_schema` reply body. The database name is not part of
    /// the reply and is supplied by the caller.
    pub fn from_json(name: impl Into<String>, json: &Value) -> Result<DatabaseSchema, SchemaError> {
        let name = name.into();
        let tables_node = json
            .get("tables")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                SchemaError::parsing(format!("database {name} is missing \"tables\""))
            })?;

        let version = json
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string);
        if version.is_none() {
            tracing::warn!(database = %name, "schema does not advertise a version");
        }

        let mut tables = BTreeMap::new();
        for (table_name, table_node) in tables_node {
            let table = TableSchema::from_json(table_name.clone(), table_node)?;
            tables.insert(table_name.clone(), table);
        }

        Ok(DatabaseSchema {
            name,
            version,
            tables,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Serializes back to the `get_schema` wire shape.
    pub fn to_json(&self) -> Value {
        let mut tables = serde_json::Map::new();
        for (name, table) in &self.tables {
            tables.insert(name.clone(), table.to_json());
        }
        let mut object = serde_json::Map::new();
        if let Some(version) = &self.version {
            object.insert("version".to_string(), json!(version));
        }
        object.insert("tables".to_string(), Value::Object(tables));
        Value::Object(object)
    }

    /// Every row carries `_uuid` and `_version` columns the server never
    /// lists in the schema document; fill them in after parse so row
    /// decoding sees them like any other column.
    pub fn populate_internally_generated_columns(&mut self) {
        for table in self.tables.values_mut() {
            if !table.has_column("_uuid") {
                table.add_column(ColumnSchema::new(
                    "_uuid",
                    ColumnType::scalar(BaseType::uuid()),
                ));
            }
            if !table.has_column("_version") {
                table.add_column(ColumnSchema::new(
                    "_version",
                    ColumnType::scalar(BaseType::uuid()),
                ));
            }
        }
    }
}
