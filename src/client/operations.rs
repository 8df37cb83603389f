//! Transact operations (RFC 7047 section 5.2) and their results.

use serde_json::{Value, json};

use crate::notation::{Row, TypedValue, UuidRef};
use crate::rpc::RpcError;
use crate::schema::DatabaseSchema;

/// Boolean functions usable in a `where` clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    Includes,
    Excludes,
}

impl Function {
    pub fn as_str(self) -> &'static str {
        match self {
            Function::Equals => "==",
            Function::NotEquals => "!=",
            Function::LessThan => "<",
            Function::LessThanOrEquals => "<=",
            Function::GreaterThan => ">",
            Function::GreaterThanOrEquals => ">=",
            Function::Includes => "includes",
            Function::Excludes => "excludes",
        }
    }
}

/// One `where` clause: `[column, function, value]` on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    column: String,
    function: Function,
    value: TypedValue,
}

impl Condition {
    pub fn new(
        column: impl Into<String>,
        function: Function,
        value: impl Into<TypedValue>,
    ) -> Self {
        Condition {
            column: column.into(),
            function,
            value: value.into(),
        }
    }

    /// The common equality clause.
    pub fn equals(column: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        Condition::new(column, Function::Equals, value)
    }

    pub fn to_json(&self) -> Value {
        json!([self.column, self.function.as_str(), self.value.to_json()])
    }
}

/// Mutators usable in a `mutate` operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutator {
    Sum,
    Difference,
    Product,
    Quotient,
    Remainder,
    Insert,
    Delete,
}

impl Mutator {
    pub fn as_str(self) -> &'static str {
        match self {
            Mutator::Sum => "+=",
            Mutator::Difference => "-=",
            Mutator::Product => "*=",
            Mutator::Quotient => "/=",
            Mutator::Remainder => "%=",
            Mutator::Insert => "insert",
            Mutator::Delete => "delete",
        }
    }
}

/// One mutation: `[column, mutator, value]` on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    column: String,
    mutator: Mutator,
    value: TypedValue,
}

impl Mutation {
    pub fn new(
        column: impl Into<String>,
        mutator: Mutator,
        value: impl Into<TypedValue>,
    ) -> Self {
        Mutation {
            column: column.into(),
            mutator,
            value: value.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!([self.column, self.mutator.as_str(), self.value.to_json()])
    }
}

/// One operation of a transact batch.
#[derive(Clone, Debug)]
pub enum Operation {
    Insert {
        table: String,
        row: Row,
        uuid_name: Option<String>,
    },
    Update {
        table: String,
        conditions: Vec<Condition>,
        row: Row,
    },
    Mutate {
        table: String,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
    Select {
        table: String,
        conditions: Vec<Condition>,
        columns: Vec<String>,
    },
    Commit {
        durable: bool,
    },
    Abort,
    Comment {
        comment: String,
    },
}

impl Operation {
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Operation::Insert {
            table: table.into(),
            row,
            uuid_name: None,
        }
    }

    /// An insert whose row other operations in the same batch can reference
    /// through `["named-uuid", name]`.
    pub fn insert_named(table: impl Into<String>, row: Row, uuid_name: impl Into<String>) -> Self {
        Operation::Insert {
            table: table.into(),
            row,
            uuid_name: Some(uuid_name.into()),
        }
    }

    pub fn update(table: impl Into<String>, conditions: Vec<Condition>, row: Row) -> Self {
        Operation::Update {
            table: table.into(),
            conditions,
            row,
        }
    }

    pub fn mutate(
        table: impl Into<String>,
        conditions: Vec<Condition>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Operation::Mutate {
            table: table.into(),
            conditions,
            mutations,
        }
    }

    pub fn delete(table: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Operation::Delete {
            table: table.into(),
            conditions,
        }
    }

    pub fn select(
        table: impl Into<String>,
        conditions: Vec<Condition>,
        columns: Vec<String>,
    ) -> Self {
        Operation::Select {
            table: table.into(),
            conditions,
            columns,
        }
    }

    pub fn commit(durable: bool) -> Self {
        Operation::Commit { durable }
    }

    pub fn abort() -> Self {
        Operation::Abort
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Operation::Comment {
            comment: comment.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Operation::Insert {
                table,
                row,
                uuid_name,
            } => {
                let mut object = json!({
                    "op": "insert",
                    "table": table,
                    "row": row.to_json(),
                });
                if let Some(name) = uuid_name {
                    object["uuid-name"] = json!(name);
                }
                object
            }
            Operation::Update {
                table,
                conditions,
                row,
            } => json!({
                "op": "update",
                "table": table,
                "where": conditions_json(conditions),
                "row": row.to_json(),
            }),
            Operation::Mutate {
                table,
                conditions,
                mutations,
            } => json!({
                "op": "mutate",
                "table": table,
                "where": conditions_json(conditions),
                "mutations": mutations.iter().map(Mutation::to_json).collect::<Vec<_>>(),
            }),
            Operation::Delete { table, conditions } => json!({
                "op": "delete",
                "table": table,
                "where": conditions_json(conditions),
            }),
            Operation::Select {
                table,
                conditions,
                columns,
            } => json!({
                "op": "select",
                "table": table,
                "where": conditions_json(conditions),
                "columns": columns,
            }),
            Operation::Commit { durable } => json!({"op": "commit", "durable": durable}),
            Operation::Abort => json!({"op": "abort"}),
            Operation::Comment { comment } => json!({"op": "comment", "comment": comment}),
        }
    }
}

fn conditions_json(conditions: &[Condition]) -> Value {
    Value::Array(conditions.iter().map(Condition::to_json).collect())
}

/// Assembles the `transact` params: the database name followed by the
/// operations, evaluated in order.
pub struct TransactBuilder {
    database: String,
    operations: Vec<Operation>,
}

impl TransactBuilder {
    pub fn new(schema: &DatabaseSchema) -> Self {
        TransactBuilder {
            database: schema.name().to_string(),
            operations: Vec::new(),
        }
    }

    pub fn add(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn build_params(&self) -> Vec<Value> {
        let mut params = Vec::with_capacity(self.operations.len() + 1);
        params.push(json!(self.database));
        params.extend(self.operations.iter().map(Operation::to_json));
        params
    }
}

/// One slot of a transact reply. Slots keep the index of their operation;
/// a failed batch reports the failing slot's `error` and, per RFC 7047,
/// "referenced operation failed" style errors in the slots after it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationResult {
    pub count: Option<u64>,
    pub uuid: Option<UuidRef>,
    pub rows: Option<Vec<Value>>,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl OperationResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn from_json(value: &Value) -> Result<OperationResult, RpcError> {
        match value {
            // An empty slot: the server did not evaluate this operation.
            Value::Null => Ok(OperationResult::default()),
            Value::Object(object) => Ok(OperationResult {
                count: object.get("count").and_then(Value::as_u64),
                uuid: object.get("uuid").and_then(UuidRef::from_json),
                rows: object
                    .get("rows")
                    .and_then(Value::as_array)
                    .map(|rows| rows.to_vec()),
                error: object
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                details: object
                    .get("details")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            other => Err(RpcError::parsing(format!(
                "operation result is not an object: {other}"
            ))),
        }
    }
}

/// Decodes a transact reply body. The list may be longer than the request
/// batch when the server appends a trailing error slot.
pub fn decode_results(value: Value) -> Result<Vec<OperationResult>, RpcError> {
    let Value::Array(slots) = value else {
        return Err(RpcError::parsing(format!(
            "transact reply is not an array: {value}"
        )));
    };
    slots.iter().map(OperationResult::from_json).collect()
}
