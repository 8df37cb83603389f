//! OVSDB wire value notation (RFC 7047 section 5.1).
//!
//! Scalars are bare JSON; sets are `["set", [v...]]` (one-element sets may
//! appear as the bare scalar); maps are `["map", [[k, v]...]]`; uuid
//! references are `["uuid", "<hex>"]` or `["named-uuid", "<token>"]`.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Value, json};
use uuid::Uuid;

/// A uuid reference: either a concrete row uuid assigned by the server or a
/// named placeholder bound within a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum UuidRef {
    Uuid(Uuid),
    Named(String),
}

impl UuidRef {
    pub fn random() -> Self {
        UuidRef::Uuid(Uuid::new_v4())
    }

    /// Decodes a `["uuid", ...]` / `["named-uuid", ...]` pair. Returns `None`
    /// for any other shape.
    pub fn from_json(value: &Value) -> Option<UuidRef> {
        let pair = value.as_array()?;
        if pair.len() != 2 {
            return None;
        }
        let tag = pair[0].as_str()?;
        let body = pair[1].as_str()?;
        match tag {
            "uuid" => Uuid::parse_str(body).ok().map(UuidRef::Uuid),
            "named-uuid" => Some(UuidRef::Named(body.to_string())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            UuidRef::Uuid(uuid) => json!(["uuid", uuid.to_string()]),
            UuidRef::Named(name) => json!(["named-uuid", name]),
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            UuidRef::Uuid(uuid) => Some(*uuid),
            UuidRef::Named(_) => None,
        }
    }
}

impl fmt::Display for UuidRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UuidRef::Uuid(uuid) => write!(f, "{uuid}"),
            UuidRef::Named(name) => write!(f, "named-uuid:{name}"),
        }
    }
}

impl From<Uuid> for UuidRef {
    fn from(uuid: Uuid) -> Self {
        UuidRef::Uuid(uuid)
    }
}

/// A single typed scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
    Uuid(UuidRef),
}

impl Atom {
    /// The concrete kind name, used in type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Atom::Integer(_) => "integer",
            Atom::Real(_) => "real",
            Atom::Boolean(_) => "boolean",
            Atom::String(_) => "string",
            Atom::Uuid(_) => "uuid",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Atom::Integer(v) => json!(v),
            Atom::Real(v) => json!(v),
            Atom::Boolean(v) => json!(v),
            Atom::String(v) => json!(v),
            Atom::Uuid(v) => v.to_json(),
        }
    }
}

impl From<i64> for Atom {
    fn from(v: i64) -> Self {
        Atom::Integer(v)
    }
}

impl From<f64> for Atom {
    fn from(v: f64) -> Self {
        Atom::Real(v)
    }
}

impl From<bool> for Atom {
    fn from(v: bool) -> Self {
        Atom::Boolean(v)
    }
}

impl From<&str> for Atom {
    fn from(v: &str) -> Self {
        Atom::String(v.to_string())
    }
}

impl From<String> for Atom {
    fn from(v: String) -> Self {
        Atom::String(v)
    }
}

impl From<UuidRef> for Atom {
    fn from(v: UuidRef) -> Self {
        Atom::Uuid(v)
    }
}

/// An insertion-ordered, duplicate-free collection of atoms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OvsdbSet {
    items: Vec<Atom>,
}

impl OvsdbSet {
    pub fn new() -> Self {
        OvsdbSet::default()
    }

    /// Inserts an atom; duplicates are a no-op. Returns whether the set grew.
    pub fn insert(&mut self, atom: Atom) -> bool {
        if self.items.contains(&atom) {
            return false;
        }
        self.items.push(atom);
        true
    }

    pub fn contains(&self, atom: &Atom) -> bool {
        self.items.contains(atom)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.items.iter()
    }

    /// One-element sets serialize as the bare scalar; everything else as the
    /// explicit `["set", [...]]` pair.
    pub fn to_json(&self) -> Value {
        if self.items.len() == 1 {
            return self.items[0].to_json();
        }
        let elems: Vec<Value> = self.items.iter().map(Atom::to_json).collect();
        json!(["set", elems])
    }
}

impl FromIterator<Atom> for OvsdbSet {
    fn from_iter<I: IntoIterator<Item = Atom>>(iter: I) -> Self {
        let mut set = OvsdbSet::new();
        for atom in iter {
            set.insert(atom);
        }
        set
    }
}

/// An insertion-ordered key/value pair collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OvsdbMap {
    entries: Vec<(Atom, Atom)>,
}

impl OvsdbMap {
    pub fn new() -> Self {
        OvsdbMap::default()
    }

    /// Inserts a pair, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: Atom, value: Atom) {
        for entry in &mut self.entries {
            if entry.0 == key {
                entry.1 = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &Atom) -> Option<&Atom> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Atom, Atom)> {
        self.entries.iter()
    }

    pub fn to_json(&self) -> Value {
        let pairs: Vec<Value> = self
            .entries
            .iter()
            .map(|(k, v)| json!([k.to_json(), v.to_json()]))
            .collect();
        json!(["map", pairs])
    }
}

impl FromIterator<(Atom, Atom)> for OvsdbMap {
    fn from_iter<I: IntoIterator<Item = (Atom, Atom)>>(iter: I) -> Self {
        let mut map = OvsdbMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// A decoded column value: scalar, set, or map, per the column's type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    Atom(Atom),
    Set(OvsdbSet),
    Map(OvsdbMap),
}

impl TypedValue {
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::Atom(atom) => atom.to_json(),
            TypedValue::Set(set) => set.to_json(),
            TypedValue::Map(map) => map.to_json(),
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            TypedValue::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&OvsdbSet> {
        match self {
            TypedValue::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&OvsdbMap> {
        match self {
            TypedValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Atom> for TypedValue {
    fn from(v: Atom) -> Self {
        TypedValue::Atom(v)
    }
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Atom(Atom::Integer(v))
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Atom(Atom::Real(v))
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Atom(Atom::Boolean(v))
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::Atom(Atom::from(v))
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::Atom(Atom::String(v))
    }
}

impl From<UuidRef> for TypedValue {
    fn from(v: UuidRef) -> Self {
        TypedValue::Atom(Atom::Uuid(v))
    }
}

impl From<OvsdbSet> for TypedValue {
    fn from(v: OvsdbSet) -> Self {
        TypedValue::Set(v)
    }
}

impl From<OvsdbMap> for TypedValue {
    fn from(v: OvsdbMap) -> Self {
        TypedValue::Map(v)
    }
}

/// A row: ordered mapping from column name to typed value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, TypedValue>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<TypedValue>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&TypedValue> {
        self.columns.get(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypedValue)> {
        self.columns.iter()
    }

    /// The uuid of this row, if its `_uuid` column is present.
    pub fn uuid(&self) -> Option<Uuid> {
        match self.columns.get("_uuid") {
            Some(TypedValue::Atom(Atom::Uuid(uuid))) => uuid.as_uuid(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = serde_json::Map::new();
        for (name, value) in &self.columns {
            object.insert(name.clone(), value.to_json());
        }
        Value::Object(object)
    }
}
