//! Column types: multiplicity, the atomic/key-valued split, and the wire
//! value codec.

use serde_json::{Value, json};

use crate::notation::{OvsdbMap, OvsdbSet, TypedValue};

use super::base_type::BaseType;
use super::{SchemaError, ValueError};

/// `"max": "unlimited"` maps to the largest representable count.
pub const UNLIMITED: i64 = i64::MAX;

/// A column's type: a value base type, an optional key base type (making the
/// column a map), and the element multiplicity.
///
/// With no key type and `min == max == 1` the column is a scalar; with no
/// key type otherwise it is a set; with a key type it is a map.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnType {
    value_type: BaseType,
    key_type: Option<BaseType>,
    min: i64,
    max: i64,
}

impl ColumnType {
    pub fn scalar(value_type: BaseType) -> Self {
        ColumnType {
            value_type,
            key_type: None,
            min: 1,
            max: 1,
        }
    }

    pub fn set(value_type: BaseType, min: i64, max: i64) -> Self {
        ColumnType {
            value_type,
            key_type: None,
            min,
            max,
        }
    }

    pub fn map(key_type: BaseType, value_type: BaseType, min: i64, max: i64) -> Self {
        ColumnType {
            value_type,
            key_type: Some(key_type),
            min,
            max,
        }
    }

    pub fn value_type(&self) -> &BaseType {
        &self.value_type
    }

    pub fn key_type(&self) -> Option<&BaseType> {
        self.key_type.as_ref()
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn is_map(&self) -> bool {
        self.key_type.is_some()
    }

    pub fn is_multi_valued(&self) -> bool {
        self.min != self.max
    }

    /// Parses a column `"type"` member. The node is key-valued exactly when
    /// it is an object carrying a `"value"` property; otherwise it is
    /// atomic, and may be a bare string naming a scalar type.
    pub fn from_json(json: &Value) -> Result<ColumnType, SchemaError> {
        let key_valued = json.get("value").is_some();

        let key_type = match BaseType::from_json(json, "key")? {
            Some(base) => base,
            None => {
                return Err(SchemaError::UnknownColumnType {
                    json: json.to_string(),
                });
            }
        };

        let (min, max) = parse_multiplicity(json)?;

        let column = if key_valued {
            let value_type = BaseType::from_json(json, "value")?.ok_or_else(|| {
                SchemaError::parsing(format!("key-valued column has malformed value type: {json}"))
            })?;
            ColumnType {
                value_type,
                key_type: Some(key_type),
                min,
                max,
            }
        } else {
            ColumnType {
                value_type: key_type,
                key_type: None,
                min,
                max,
            }
        };

        // RFC 7047 section 3.2: after defaults, min must be exactly 0 or 1,
        // max must be at least 1 and at least min.
        if !(column.min == 0 || column.min == 1) || column.max < 1 || column.max < column.min {
            return Err(SchemaError::parsing(format!(
                "invalid multiplicity min={} max={}",
                column.min, column.max
            )));
        }

        Ok(column)
    }

    /// Serializes back to the column `"type"` wire shape. Defaulted
    /// multiplicity is omitted; an unbounded maximum becomes `"unlimited"`.
    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        match &self.key_type {
            Some(key_type) => {
                object.insert("key".to_string(), key_type.to_json());
                object.insert("value".to_string(), self.value_type.to_json());
            }
            None => {
                object.insert("key".to_string(), self.value_type.to_json());
            }
        }
        if self.min != 1 {
            object.insert("min".to_string(), json!(self.min));
        }
        if self.max == UNLIMITED {
            object.insert("max".to_string(), json!("unlimited"));
        } else if self.max != 1 {
            object.insert("max".to_string(), json!(self.max));
        }
        Value::Object(object)
    }

    /// Decodes a wire value into this column's typed value.
    pub fn value_from_json(&self, json: &Value) -> Result<TypedValue, ValueError> {
        if self.is_map() {
            return self.map_from_json(json);
        }
        if !self.is_multi_valued() {
            return self.value_type.to_atom(json).map(TypedValue::Atom);
        }
        self.set_from_json(json)
    }

    fn set_from_json(&self, json: &Value) -> Result<TypedValue, ValueError> {
        let Some(array) = json.as_array() else {
            // Legacy shorthand: a bare scalar is a one-element set.
            let mut set = OvsdbSet::new();
            set.insert(self.value_type.to_atom(json)?);
            return Ok(TypedValue::Set(set));
        };

        if array.len() == 2
            && array[0].as_str() == Some("set")
            && let Some(elements) = array[1].as_array()
        {
            let mut set = OvsdbSet::new();
            for element in elements {
                set.insert(self.value_type.to_atom(element)?);
            }
            return Ok(TypedValue::Set(set));
        }

        // A bare uuid pair is the one-element shorthand for uuid sets.
        match self.value_type.to_atom(json) {
            Ok(atom) => {
                let mut set = OvsdbSet::new();
                set.insert(atom);
                Ok(TypedValue::Set(set))
            }
            Err(_) => Err(ValueError::malformed(format!(
                "array is neither [\"set\", ...] nor a single element: {json}"
            ))),
        }
    }

    fn map_from_json(&self, json: &Value) -> Result<TypedValue, ValueError> {
        let key_type = self.key_type.as_ref().expect("map column has a key type");

        let pair = json
            .as_array()
            .filter(|a| a.len() == 2 && a[0].as_str() == Some("map"))
            .ok_or_else(|| ValueError::malformed(format!("expected [\"map\", ...], got {json}")))?;
        let pairs = pair[1]
            .as_array()
            .ok_or_else(|| ValueError::malformed(format!("map body is not an array: {json}")))?;

        let mut map = OvsdbMap::new();
        for entry in pairs {
            let kv = entry
                .as_array()
                .filter(|kv| kv.len() == 2)
                .ok_or_else(|| ValueError::malformed(format!("map pair is not a 2-array: {entry}")))?;
            let key = key_type.to_atom(&kv[0])?;
            let value = self.value_type.to_atom(&kv[1])?;
            map.insert(key, value);
        }
        Ok(TypedValue::Map(map))
    }

    /// Validates each element of a typed value against the value base type.
    pub fn validate(&self, value: &TypedValue) -> Result<(), ValueError> {
        match value {
            TypedValue::Atom(atom) => self.value_type.validate(atom),
            TypedValue::Set(set) => {
                for atom in set.iter() {
                    self.value_type.validate(atom)?;
                }
                Ok(())
            }
            TypedValue::Map(map) => {
                for (_, atom) in map.iter() {
                    self.value_type.validate(atom)?;
                }
                Ok(())
            }
        }
    }
}

/// `min`/`max` parsing shared by the atomic and key-valued shapes; each
/// defaults to 1, and `"unlimited"` lifts the maximum.
fn parse_multiplicity(json: &Value) -> Result<(i64, i64), SchemaError> {
    let min = match json.get("min") {
        None => 1,
        Some(node) => node
            .as_i64()
            .ok_or_else(|| SchemaError::parsing(format!("malformed min: {node}")))?,
    };
    let max = match json.get("max") {
        None => 1,
        Some(node) => {
            if let Some(number) = node.as_i64() {
                number
            } else if node.as_str() == Some("unlimited") {
                UNLIMITED
            } else {
                return Err(SchemaError::parsing(format!("malformed max: {node}")));
            }
        }
    };
    Ok((min, max))
}

/// A named column and its type. Immutable once parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    name: String,
    column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSchema {
            name: name.into(),
            column_type,
        }
    }

    pub fn from_json(name: impl Into<String>, json: &Value) -> Result<ColumnSchema, SchemaError> {
        let type_node = json
            .get("type")
            .ok_or_else(|| SchemaError::parsing(format!("column is missing \"type\": {json}")))?;
        Ok(ColumnSchema {
            name: name.into(),
            column_type: ColumnType::from_json(type_node)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.column_type
    }

    pub fn to_json(&self) -> Value {
        json!({"type": self.column_type.to_json()})
    }
}
