//! Record and chunk types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BulkError;

/// Maximum number of items the backend accepts in one batch write request.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// The identity attributes of a record (e.g. `{"id": "u1", "sk": "METADATA"}`).
pub type ItemKey = Map<String, Value>;

/// An opaque key-value item to be persisted.
///
/// The orchestrator never looks inside a record; only stores care about the
/// key fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Extract the given key fields. Returns `None` if any of them is missing.
    pub fn key(&self, fields: &[&str]) -> Option<ItemKey> {
        fields
            .iter()
            .map(|f| self.0.get(*f).map(|v| ((*f).to_string(), v.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = BulkError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(BulkError::invalid(format!(
                "record must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An ordered, non-empty group of records sent in one write request.
///
/// `index` is the position of the originating chunk in the job input. Retries
/// build new chunks from the unprocessed subset and keep the same index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    index: usize,
    records: Vec<Record>,
}

impl Chunk {
    /// Build a chunk. Fails on an empty record list.
    pub fn new(index: usize, records: Vec<Record>) -> Result<Self, BulkError> {
        if records.is_empty() {
            return Err(BulkError::invalid("chunk must contain at least one record"));
        }
        Ok(Self { index, records })
    }

    /// Callers guarantee `records` is non-empty.
    pub(crate) fn from_parts(index: usize, records: Vec<Record>) -> Self {
        debug_assert!(!records.is_empty());
        Self { index, records }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
