//! Record and RecordSet types
//!
//! A [`Record`] is an ordered mapping of field name to JSON scalar/array
//! value. Neither type enforces a schema; field presence is checked
//! defensively by the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RelationError, RelationResult};

/// Ordered field map backing a record. Field order is insertion order.
pub type Fields = Map<String, Value>;

/// An ordered sequence of records, as returned by set-valued fetches.
pub type RecordSet = Vec<Record>;

/// A single schemaless record: ordered field name -> value mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Fields,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from an existing field map
    pub fn from_fields(fields: Fields) -> Self {
        Self { fields }
    }

    /// Create a record from a JSON value; fails unless the value is an object
    pub fn from_value(value: Value) -> RelationResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(RelationError::InvalidInput(format!(
                "expected a record mapping, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value, preserving position for existing fields
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Remove a field, returning its previous value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Check whether a field is present
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the record into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

/// Human-readable kind of a JSON value, for error messages
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_value() {
        let record = Record::from_value(json!({"id": 1, "name": "widget"})).unwrap();
        assert_eq!(record.get("id"), Some(&json!(1)));
        assert_eq!(record.get("name"), Some(&json!("widget")));
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn test_record_from_non_object_fails() {
        let err = Record::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, crate::error::RelationError::InvalidInput(_)));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_field_order_is_preserved() {
        let mut record = Record::new();
        record.set("zebra", json!(1));
        record.set("apple", json!(2));
        record.set("mango", json!(3));

        let names: Vec<&String> = record.fields().keys().collect();
        assert_eq!(names, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut record = Record::from_value(json!({"a": 1, "b": 2})).unwrap();
        record.set("a", json!(10));

        assert_eq!(record.get("a"), Some(&json!(10)));
        let names: Vec<&String> = record.fields().keys().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_round_trip_serialization() {
        let record = Record::from_value(json!({"id": 7, "tags": ["a", "b"]})).unwrap();
        let text = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(record, back);
    }
}
