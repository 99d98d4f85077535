use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::LazyLock;

/// Name of the identifier field every record carries
pub const KEY_FIELD: &str = "userId";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,254}$").expect("static regex"));

/// Returns true if `name` is usable as a table or attribute name
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Raised when a JSON document cannot be used as a record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record must be a JSON object")]
    NotAnObject,
    #[error("record is missing a non-empty string `userId` field")]
    MissingKey,
}

/// A single user record: a flat JSON object with a required `userId` field.
///
/// The key is checked whenever a record is built, so every `Record` in the
/// program carries a non-empty string key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, JsonValue>", into = "Map<String, JsonValue>")]
pub struct Record(Map<String, JsonValue>);

impl Record {
    pub fn key(&self) -> &str {
        self.0
            .get(KEY_FIELD)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    /// Set a non-key field. Writing the key field goes through [`Record::try_from`].
    pub fn set(&mut self, field: &FieldName, value: JsonValue) {
        self.0.insert(field.as_str().to_string(), value);
    }
}

impl TryFrom<Map<String, JsonValue>> for Record {
    type Error = RecordError;

    fn try_from(fields: Map<String, JsonValue>) -> Result<Self, Self::Error> {
        match fields.get(KEY_FIELD) {
            Some(JsonValue::String(key)) if !key.is_empty() => Ok(Record(fields)),
            _ => Err(RecordError::MissingKey),
        }
    }
}

impl TryFrom<JsonValue> for Record {
    type Error = RecordError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(fields) => Record::try_from(fields),
            _ => Err(RecordError::NotAnObject),
        }
    }
}

impl From<Record> for Map<String, JsonValue> {
    fn from(record: Record) -> Self {
        record.0
    }
}

impl From<Record> for JsonValue {
    fn from(record: Record) -> Self {
        JsonValue::Object(record.0)
    }
}

/// A field name that is safe to hand to a store update.
///
/// Only plain identifiers are accepted, and the key field itself is refused
/// because updates never move a record to a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldName(String);

impl FieldName {
    pub fn parse(name: &str) -> Option<Self> {
        if name != KEY_FIELD && is_identifier(name) {
            Some(FieldName(name.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
