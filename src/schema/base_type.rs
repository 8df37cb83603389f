//! Atomic base types and their constraints.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::notation::{Atom, UuidRef};

use super::{SchemaError, ValueError};

/// Reference semantics of a uuid column (RFC 7047 section 3.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefType {
    Strong,
    Weak,
}

/// An atomic type as advertised by the schema, including the optional
/// range/length/enum constraints of its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum BaseType {
    Integer {
        min: Option<i64>,
        max: Option<i64>,
        enum_values: Option<Vec<i64>>,
    },
    Real {
        min: Option<f64>,
        max: Option<f64>,
        enum_values: Option<Vec<f64>>,
    },
    Boolean,
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        enum_values: Option<Vec<String>>,
    },
    Uuid {
        ref_table: Option<String>,
        ref_type: RefType,
    },
}

impl BaseType {
    pub fn integer() -> Self {
        BaseType::Integer {
            min: None,
            max: None,
            enum_values: None,
        }
    }

    pub fn real() -> Self {
        BaseType::Real {
            min: None,
            max: None,
            enum_values: None,
        }
    }

    pub fn string() -> Self {
        BaseType::String {
            min_length: None,
            max_length: None,
            enum_values: None,
        }
    }

    pub fn uuid() -> Self {
        BaseType::Uuid {
            ref_table: None,
            ref_type: RefType::Strong,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BaseType::Integer { .. } => "integer",
            BaseType::Real { .. } => "real",
            BaseType::Boolean => "boolean",
            BaseType::String { .. } => "string",
            BaseType::Uuid { .. } => "uuid",
        }
    }

    pub fn ref_table(&self) -> Option<&str> {
        match self {
            BaseType::Uuid { ref_table, .. } => ref_table.as_deref(),
            _ => None,
        }
    }

    fn named(name: &str) -> Option<BaseType> {
        match name {
            "integer" => Some(BaseType::integer()),
            "real" => Some(BaseType::real()),
            "boolean" => Some(BaseType::Boolean),
            "string" => Some(BaseType::string()),
            "uuid" => Some(BaseType::uuid()),
            _ => None,
        }
    }

    /// Extracts the base type stored under `field` ("key" or "value") of a
    /// column type node. Three shapes are accepted: a bare string naming a
    /// scalar type (only meaningful when the node itself is the type), an
    /// object carrying `"type"` plus constraints, and absence (`Ok(None)`).
    pub fn from_json(json: &Value, field: &str) -> Result<Option<BaseType>, SchemaError> {
        let node = match json {
            Value::String(_) if field == "key" => json,
            Value::Object(object) => match object.get(field) {
                Some(node) => node,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };

        match node {
            Value::String(name) => Ok(BaseType::named(name)),
            Value::Object(object) => {
                let Some(name) = object.get("type").and_then(Value::as_str) else {
                    return Ok(None);
                };
                let Some(base) = BaseType::named(name) else {
                    return Ok(None);
                };
                base.with_constraints(node).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn with_constraints(self, node: &Value) -> Result<BaseType, SchemaError> {
        match self {
            BaseType::Integer { .. } => Ok(BaseType::Integer {
                min: node.get("minInteger").and_then(Value::as_i64),
                max: node.get("maxInteger").and_then(Value::as_i64),
                enum_values: parse_enum(node, |v| v.as_i64())?,
            }),
            BaseType::Real { .. } => Ok(BaseType::Real {
                min: node.get("minReal").and_then(Value::as_f64),
                max: node.get("maxReal").and_then(Value::as_f64),
                enum_values: parse_enum(node, |v| v.as_f64())?,
            }),
            BaseType::Boolean => Ok(BaseType::Boolean),
            BaseType::String { .. } => Ok(BaseType::String {
                min_length: node
                    .get("minLength")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize),
                max_length: node
                    .get("maxLength")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize),
                enum_values: parse_enum(node, |v| v.as_str().map(str::to_string))?,
            }),
            BaseType::Uuid { .. } => {
                let ref_table = node
                    .get("refTable")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let ref_type = match node.get("refType").and_then(Value::as_str) {
                    None | Some("strong") => RefType::Strong,
                    Some("weak") => RefType::Weak,
                    Some(other) => {
                        return Err(SchemaError::parsing(format!("unknown refType {other:?}")));
                    }
                };
                Ok(BaseType::Uuid {
                    ref_table,
                    ref_type,
                })
            }
        }
    }

    /// Serializes back to the schema wire shape: the bare type name when no
    /// constraints are set, an object carrying `"type"` otherwise.
    pub fn to_json(&self) -> Value {
        match self {
            BaseType::Integer {
                min,
                max,
                enum_values,
            } => {
                let mut object = serde_json::Map::new();
                if let Some(lo) = min {
                    object.insert("minInteger".to_string(), json!(lo));
                }
                if let Some(hi) = max {
                    object.insert("maxInteger".to_string(), json!(hi));
                }
                if let Some(allowed) = enum_values {
                    object.insert("enum".to_string(), json!(["set", allowed]));
                }
                named_or_object("integer", object)
            }
            BaseType::Real {
                min,
                max,
                enum_values,
            } => {
                let mut object = serde_json::Map::new();
                if let Some(lo) = min {
                    object.insert("minReal".to_string(), json!(lo));
                }
                if let Some(hi) = max {
                    object.insert("maxReal".to_string(), json!(hi));
                }
                if let Some(allowed) = enum_values {
                    object.insert("enum".to_string(), json!(["set", allowed]));
                }
                named_or_object("real", object)
            }
            BaseType::Boolean => json!("boolean"),
            BaseType::String {
                min_length,
                max_length,
                enum_values,
            } => {
                let mut object = serde_json::Map::new();
                if let Some(lo) = min_length {
                    object.insert("minLength".to_string(), json!(lo));
                }
                if let Some(hi) = max_length {
                    object.insert("maxLength".to_string(), json!(hi));
                }
                if let Some(allowed) = enum_values {
                    object.insert("enum".to_string(), json!(["set", allowed]));
                }
                named_or_object("string", object)
            }
            BaseType::Uuid {
                ref_table,
                ref_type,
            } => {
                let mut object = serde_json::Map::new();
                if let Some(table) = ref_table {
                    object.insert("refTable".to_string(), json!(table));
                }
                if *ref_type == RefType::Weak {
                    object.insert("refType".to_string(), json!("weak"));
                }
                named_or_object("uuid", object)
            }
        }
    }

    /// Decodes a wire scalar into an atom of this type.
    pub fn to_atom(&self, json: &Value) -> Result<Atom, ValueError> {
        match self {
            BaseType::Integer { .. } => json
                .as_i64()
                .map(Atom::Integer)
                .ok_or_else(|| ValueError::mismatch("integer", json)),
            BaseType::Real { .. } => json
                .as_f64()
                .map(Atom::Real)
                .ok_or_else(|| ValueError::mismatch("real", json)),
            BaseType::Boolean => json
                .as_bool()
                .map(Atom::Boolean)
                .ok_or_else(|| ValueError::mismatch("boolean", json)),
            BaseType::String { .. } => json
                .as_str()
                .map(Atom::from)
                .ok_or_else(|| ValueError::mismatch("string", json)),
            BaseType::Uuid { .. } => {
                if let Some(uuid) = UuidRef::from_json(json) {
                    return Ok(Atom::Uuid(uuid));
                }
                // Bare strings appear in older snapshots.
                match json.as_str() {
                    Some(text) => match Uuid::parse_str(text) {
                        Ok(uuid) => Ok(Atom::Uuid(UuidRef::Uuid(uuid))),
                        Err(_) => Ok(Atom::Uuid(UuidRef::Named(text.to_string()))),
                    },
                    None => Err(ValueError::mismatch("uuid", json)),
                }
            }
        }
    }

    /// Checks an atom against this type's kind and constraints.
    pub fn validate(&self, atom: &Atom) -> Result<(), ValueError> {
        match (self, atom) {
            (
                BaseType::Integer {
                    min,
                    max,
                    enum_values,
                },
                Atom::Integer(v),
            ) => {
                if min.is_some_and(|lo| *v < lo) || max.is_some_and(|hi| *v > hi) {
                    return Err(ValueError::invalid(format!("integer {v} out of range")));
                }
                if let Some(allowed) = enum_values
                    && !allowed.contains(v)
                {
                    return Err(ValueError::invalid(format!("integer {v} not in enum")));
                }
                Ok(())
            }
            (
                BaseType::Real {
                    min,
                    max,
                    enum_values,
                },
                Atom::Real(v),
            ) => {
                if min.is_some_and(|lo| *v < lo) || max.is_some_and(|hi| *v > hi) {
                    return Err(ValueError::invalid(format!("real {v} out of range")));
                }
                if let Some(allowed) = enum_values
                    && !allowed.contains(v)
                {
                    return Err(ValueError::invalid(format!("real {v} not in enum")));
                }
                Ok(())
            }
            (BaseType::Boolean, Atom::Boolean(_)) => Ok(()),
            (
                BaseType::String {
                    min_length,
                    max_length,
                    enum_values,
                },
                Atom::String(v),
            ) => {
                let len = v.chars().count();
                if min_length.is_some_and(|lo| len < lo) || max_length.is_some_and(|hi| len > hi) {
                    return Err(ValueError::invalid(format!(
                        "string length {len} out of range"
                    )));
                }
                if let Some(allowed) = enum_values
                    && !allowed.contains(v)
                {
                    return Err(ValueError::invalid(format!("string {v:?} not in enum")));
                }
                Ok(())
            }
            (BaseType::Uuid { .. }, Atom::Uuid(_)) => Ok(()),
            (expected, actual) => Err(ValueError::TypeMismatch {
                expected: expected.kind(),
                actual: actual.kind().to_string(),
            }),
        }
    }
}

fn named_or_object(name: &str, mut object: serde_json::Map<String, Value>) -> Value {
    if object.is_empty() {
        return json!(name);
    }
    object.insert("type".to_string(), json!(name));
    Value::Object(object)
}

/// The schema `enum` member is itself an OVSDB value: a scalar or
/// `["set", [...]]`.
fn parse_enum<T>(
    node: &Value,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Option<Vec<T>>, SchemaError> {
    let Some(member) = node.get("enum") else {
        return Ok(None);
    };

    let elements: Vec<&Value> = match member {
        Value::Array(pair)
            if pair.len() == 2 && pair[0].as_str() == Some("set") && pair[1].is_array() =>
        {
            pair[1].as_array().expect("checked array").iter().collect()
        }
        Value::Array(_) => {
            return Err(SchemaError::parsing(format!("malformed enum {member}")));
        }
        scalar => vec![scalar],
    };

    let mut values = Vec::with_capacity(elements.len());
    for element in elements {
        let Some(value) = convert(element) else {
            return Err(SchemaError::parsing(format!(
                "enum element {element} does not match the column's type"
            )));
        };
        values.push(value);
    }
    Ok(Some(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string_names_a_key_type() {
        let base = BaseType::from_json(&json!("string"), "key").unwrap();
        assert_eq!(base, Some(BaseType::string()));
        // A bare string can never name the value member.
        let base = BaseType::from_json(&json!("string"), "value").unwrap();
        assert_eq!(base, None);
    }

    #[test]
    fn object_with_constraints() {
        let node = json!({"key": {"type": "integer", "minInteger": 0, "maxInteger": 4095}});
        let base = BaseType::from_json(&node, "key").unwrap().unwrap();
        assert_eq!(
            base,
            BaseType::Integer {
                min: Some(0),
                max: Some(4095),
                enum_values: None,
            }
        );
    }

    #[test]
    fn absent_field_is_none() {
        let node = json!({"key": "integer"});
        assert_eq!(BaseType::from_json(&node, "value").unwrap(), None);
    }

    #[test]
    fn uuid_with_ref_table() {
        let node = json!({"value": {"type": "uuid", "refTable": "Queue", "refType": "weak"}});
        let base = BaseType::from_json(&node, "value").unwrap().unwrap();
        assert_eq!(
            base,
            BaseType::Uuid {
                ref_table: Some("Queue".into()),
                ref_type: RefType::Weak,
            }
        );
    }

    #[test]
    fn string_enum_from_set() {
        let node = json!({"key": {
            "type": "string",
            "enum": ["set", ["secure", "standalone"]]
        }});
        let base = BaseType::from_json(&node, "key").unwrap().unwrap();
        assert!(base.validate(&Atom::from("secure")).is_ok());
        let err = base.validate(&Atom::from("open")).unwrap_err();
        assert!(matches!(err, ValueError::InvalidValue { .. }));
    }

    #[test]
    fn integer_range_validation() {
        let base = BaseType::Integer {
            min: Some(0),
            max: Some(4095),
            enum_values: None,
        };
        assert!(base.validate(&Atom::Integer(100)).is_ok());
        assert!(base.validate(&Atom::Integer(5000)).is_err());
        let err = base.validate(&Atom::from("oops")).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    #[test]
    fn serialized_base_type_reparses_identically() {
        let nodes = [
            json!({"key": "boolean"}),
            json!({"key": {"type": "integer", "minInteger": 0, "maxInteger": 4095}}),
            json!({"key": {"type": "real", "minReal": 0.0}}),
            json!({"key": {"type": "string", "minLength": 1, "maxLength": 8,
                           "enum": ["set", ["secure", "standalone"]]}}),
            json!({"key": {"type": "uuid", "refTable": "Queue", "refType": "weak"}}),
        ];
        for node in nodes {
            let parsed = BaseType::from_json(&node, "key").unwrap().unwrap();
            let wire = json!({"key": parsed.to_json()});
            let reparsed = BaseType::from_json(&wire, "key").unwrap().unwrap();
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn atom_decode_by_kind() {
        assert_eq!(
            BaseType::integer().to_atom(&json!(7)).unwrap(),
            Atom::Integer(7)
        );
        assert_eq!(
            BaseType::Boolean.to_atom(&json!(true)).unwrap(),
            Atom::Boolean(true)
        );
        assert!(BaseType::integer().to_atom(&json!("x")).is_err());

        let uuid = uuid::Uuid::new_v4();
        let atom = BaseType::uuid()
            .to_atom(&json!(["uuid", uuid.to_string()]))
            .unwrap();
        assert_eq!(atom, Atom::Uuid(UuidRef::Uuid(uuid)));
    }
}
