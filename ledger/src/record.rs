//! Opaque records.
//!
//! A record is a mapping from field name to JSON value. The store only ever
//! looks at the identifier, the table's date field, and fields named in a
//! search; everything else passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Name of the identifier field every stored record carries.
pub const ID_FIELD: &str = "id";

/// One row of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// The record identifier, if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        match self.0.get(ID_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Set the identifier, replacing any existing one.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Does this record carry the given identifier?
    pub fn has_id(&self, id: &str) -> bool {
        self.id() == Some(id)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Field names in this record.
    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Text form of a field, used for matching.
    ///
    /// Strings are returned verbatim, numbers and booleans via their display
    /// form. Null, absent, and nested values have no text form.
    pub fn text(&self, field: &str) -> Option<String> {
        value_text(self.0.get(field)?)
    }

    /// Drop fields holding an explicit null (a blank cell).
    pub fn without_nulls(mut self) -> Self {
        self.0.retain(|_, v| !v.is_null());
        self
    }

    /// Copy every field of `other` into this record, overwriting on conflict.
    pub fn merge_from(&mut self, other: &Record) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Generate a fresh record identifier (UUIDv7, time-ordered).
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Text form of a scalar JSON value.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
