//! Schema model and value codec.
//!
//! A server-advertised database schema (RFC 7047 section 3) is parsed into
//! `DatabaseSchema` / `TableSchema` / `ColumnSchema` / `ColumnType` /
//! `BaseType`, and each `(ColumnType, JSON)` pair on the wire decodes into a
//! `TypedValue` through the column's type.

mod base_type;
mod column;
mod database;
mod table;

pub use base_type::{BaseType, RefType};
pub use column::{ColumnSchema, ColumnType, UNLIMITED};
pub use database::DatabaseSchema;
pub use table::TableSchema;

use thiserror::Error;

/// Schema document failures, raised while parsing a `get_schema` reply.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema parse failed: {reason}")]
    Parsing { reason: String },

    #[error("no column type matches {json}")]
    UnknownColumnType { json: String },
}

impl SchemaError {
    pub fn parsing(reason: impl Into<String>) -> Self {
        SchemaError::Parsing {
            reason: reason.into(),
        }
    }
}

/// Wire value failures, raised while decoding or validating column values.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    #[error("malformed value: {reason}")]
    MalformedValue { reason: String },
}

impl ValueError {
    pub fn mismatch(expected: &'static str, actual: &serde_json::Value) -> Self {
        ValueError::TypeMismatch {
            expected,
            actual: json_kind(actual).to_string(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        ValueError::InvalidValue {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        ValueError::MalformedValue {
            reason: reason.into(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
