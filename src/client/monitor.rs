//! Monitor subscriptions: request shapes, the update decode path, and the
//! caller-facing callback.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::notation::Row;
use crate::schema::{DatabaseSchema, TableSchema, ValueError};

/// Opaque identifier binding a subscription to its callback. UUID-shaped
/// when allocated by the client; callers may supply their own for resume.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MonitorHandle(String);

impl MonitorHandle {
    pub fn new(id: impl Into<String>) -> Self {
        MonitorHandle(id.into())
    }

    pub fn random() -> Self {
        MonitorHandle(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Which row events a monitor subscribes to; everything by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorSelect {
    pub initial: bool,
    pub insert: bool,
    pub delete: bool,
    pub modify: bool,
}

impl Default for MonitorSelect {
    fn default() -> Self {
        MonitorSelect {
            initial: true,
            insert: true,
            delete: true,
            modify: true,
        }
    }
}

impl MonitorSelect {
    fn to_json(self) -> Value {
        json!({
            "initial": self.initial,
            "insert": self.insert,
            "delete": self.delete,
            "modify": self.modify,
        })
    }
}

/// One table's subscription: the columns to watch and the event selection.
#[derive(Clone, Debug)]
pub struct MonitorRequest {
    table_name: String,
    columns: Vec<String>,
    select: MonitorSelect,
}

impl MonitorRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        MonitorRequest {
            table_name: table_name.into(),
            columns: Vec::new(),
            select: MonitorSelect::default(),
        }
    }

    pub fn add_column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn with_select(mut self, select: MonitorSelect) -> Self {
        self.select = select;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn to_json(&self) -> Value {
        json!({
            "columns": self.columns,
            "select": self.select.to_json(),
        })
    }
}

/// Builds the `monitor` params: `[db-name, handle, {table: request}]`.
/// Requests are keyed by table name; a later request for the same table
/// replaces the earlier one.
pub(super) fn monitor_params(
    database: &str,
    handle: &MonitorHandle,
    requests: &[MonitorRequest],
) -> Vec<Value> {
    let mut by_table = serde_json::Map::new();
    for request in requests {
        by_table.insert(request.table_name.clone(), request.to_json());
    }
    vec![json!(database), json!(handle.id()), Value::Object(by_table)]
}

/// One row's change: the states before and after, absent as appropriate for
/// inserts and deletes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowUpdate {
    pub old: Option<Row>,
    pub new: Option<Row>,
}

/// All changed rows of one table, keyed by row uuid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableUpdate {
    rows: BTreeMap<Uuid, RowUpdate>,
}

impl TableUpdate {
    pub fn row(&self, uuid: &Uuid) -> Option<&RowUpdate> {
        self.rows.get(uuid)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Uuid, &RowUpdate)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TableSchema {
    /// Decodes one table's slice of an update notification:
    /// `{"<row-uuid>": {"old": {..}, "new": {..}}, ...}`.
    pub fn updates_from_json(&self, json: &Value) -> Result<TableUpdate, ValueError> {
        let object = json.as_object().ok_or_else(|| {
            ValueError::malformed(format!("table update is not an object: {json}"))
        })?;

        let mut rows = BTreeMap::new();
        for (uuid_text, row_node) in object {
            let uuid = Uuid::parse_str(uuid_text).map_err(|_| {
                ValueError::malformed(format!("table update key is not a uuid: {uuid_text}"))
            })?;
            let old = match row_node.get("old") {
                Some(node) => Some(self.row_from_json(node)?),
                None => None,
            };
            let new = match row_node.get("new") {
                Some(node) => Some(self.row_from_json(node)?),
                None => None,
            };
            rows.insert(uuid, RowUpdate { old, new });
        }
        Ok(TableUpdate { rows })
    }
}

/// A decoded update notification: changed tables by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableUpdates {
    tables: BTreeMap<String, TableUpdate>,
}

impl TableUpdates {
    /// Decodes a whole notification body through the stored schema. Tables
    /// the schema does not know are skipped.
    pub fn from_json(schema: &DatabaseSchema, json: &Value) -> Result<TableUpdates, ValueError> {
        let object = json.as_object().ok_or_else(|| {
            ValueError::malformed(format!("table updates is not an object: {json}"))
        })?;

        let mut tables = BTreeMap::new();
        for (table_name, update_node) in object {
            let Some(table) = schema.table(table_name) else {
                tracing::debug!(table = %table_name, "skipping update for unknown table");
                continue;
            };
            tables.insert(table_name.clone(), table.updates_from_json(update_node)?);
        }
        Ok(TableUpdates { tables })
    }

    pub fn table(&self, name: &str) -> Option<&TableUpdate> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &TableUpdate)> {
        self.tables.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Receives decoded updates for one monitor. Owned by the client façade for
/// the life of the subscription.
pub trait MonitorCallback: Send + Sync {
    fn update(&self, updates: TableUpdates, schema: &DatabaseSchema);

    /// A notification that failed to decode; the session stays up.
    fn error(&self, error: crate::Error);
}
