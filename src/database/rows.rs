//! Result rows
//!
//! Rows come back either as ordered key/value records or as JSON objects
//! that can be deserialized into caller types. Column order is the order
//! the engine returned.

use crate::error::Result;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One row as an ordered column → value map
pub type Record = IndexMap<String, JsonValue>;

/// A single result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Row {
    Record(Record),
    Object(JsonValue),
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        match self {
            Row::Record(record) => record.get(column),
            Row::Object(object) => object.get(column),
        }
    }

    /// Value of the first column
    pub fn first_value(&self) -> Option<&JsonValue> {
        match self {
            Row::Record(record) => record.values().next(),
            Row::Object(JsonValue::Object(map)) => map.values().next(),
            Row::Object(_) => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Row::Record(_))
    }

    pub fn into_record(self) -> Record {
        match self {
            Row::Record(record) => record,
            Row::Object(JsonValue::Object(map)) => map.into_iter().collect(),
            Row::Object(_) => Record::new(),
        }
    }

    pub fn into_json(self) -> JsonValue {
        match self {
            Row::Record(record) => JsonValue::Object(record.into_iter().collect()),
            Row::Object(object) => object,
        }
    }

    /// Deserialize the row into a caller type
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_json())?)
    }
}

/// Rows returned by a read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rows {
    /// Plain key/value records (`to_array`)
    Records(Vec<Record>),
    /// Object-like rows
    Objects(Vec<JsonValue>),
}

impl Default for Rows {
    fn default() -> Self {
        Rows::Objects(Vec::new())
    }
}

impl Rows {
    /// Shape raw records the way the caller asked for
    pub fn from_records(records: Vec<Record>, to_array: bool) -> Self {
        if to_array {
            Rows::Records(records)
        } else {
            Rows::Objects(
                records
                    .into_iter()
                    .map(|record| JsonValue::Object(record.into_iter().collect()))
                    .collect(),
            )
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Rows::Records(records) => records.len(),
            Rows::Objects(objects) => objects.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_records(&self) -> bool {
        matches!(self, Rows::Records(_))
    }

    pub fn first(self) -> Option<Row> {
        self.into_iter().next()
    }

    /// Back to plain records, whatever the shape
    pub fn into_records(self) -> Vec<Record> {
        self.into_iter().map(Row::into_record).collect()
    }

    pub fn deserialize<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.into_iter().map(Row::deserialize).collect()
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        let rows: Vec<Row> = match self {
            Rows::Records(records) => records.into_iter().map(Row::Record).collect(),
            Rows::Objects(objects) => objects.into_iter().map(Row::Object).collect(),
        };
        rows.into_iter()
    }
}

/// Read an integer out of a JSON cell, accepting numeric strings
pub fn json_to_u64(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().and_then(|i| u64::try_from(i).ok()))
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, name: &str) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), json!(id));
        record.insert("name".into(), json!(name));
        record
    }

    #[test]
    fn test_shape_follows_flag() {
        let rows = Rows::from_records(vec![record(1, "a")], true);
        assert!(rows.is_records());

        let rows = Rows::from_records(vec![record(1, "a")], false);
        assert!(!rows.is_records());
        let row = rows.first().unwrap();
        assert_eq!(row.get("name"), Some(&json!("a")));
    }

    #[test]
    fn test_column_order_is_kept() {
        let rows = Rows::from_records(vec![record(7, "x")], false);
        let row = rows.first().unwrap();
        assert_eq!(row.first_value(), Some(&json!(7)));
        let keys: Vec<String> = row.into_record().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "name"]);
    }

    #[test]
    fn test_deserialize_rows() {
        #[derive(Deserialize)]
        struct User {
            id: i64,
            name: String,
        }

        let rows = Rows::from_records(vec![record(1, "a"), record(2, "b")], false);
        let users: Vec<User> = rows.deserialize().unwrap();
        assert_eq!(users[1].id, 2);
        assert_eq!(users[1].name, "b");
    }

    #[test]
    fn test_json_to_u64() {
        assert_eq!(json_to_u64(&json!(3)), Some(3));
        assert_eq!(json_to_u64(&json!("42")), Some(42));
        assert_eq!(json_to_u64(&json!(-1)), None);
        assert_eq!(json_to_u64(&JsonValue::Null), None);
    }
}
