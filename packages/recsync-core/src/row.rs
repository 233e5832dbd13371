//! Row model shared by both record sources.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::EntitySchema;

/// Field name -> cell value. All cells are strings.
pub type FieldValues = BTreeMap<String, String>;

/// Record identifier, unique within a record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which source a row came from. Never changes after the row is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Local authoritative dataset
    Internal,
    /// Remote mirrored dataset
    External,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Internal => "Internal",
            Origin::External => "External",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as an adapter returns it, before it is tagged with an origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: RecordId,
    pub fields: FieldValues,
}

impl SourceRecord {
    pub fn new(id: impl Into<RecordId>, fields: FieldValues) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Builds a record from a JSON object. The id is read from `id` or `Id`;
    /// every other key becomes a string cell.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let id = object
            .get("id")
            .or_else(|| object.get("Id"))
            .and_then(json_id)?;
        let fields = object
            .iter()
            .filter(|(key, _)| key.as_str() != "id" && key.as_str() != "Id")
            .map(|(key, value)| (key.clone(), json_cell(value)))
            .collect();
        Some(Self { id, fields })
    }
}

/// Reads a record id from a JSON string or number.
pub(crate) fn json_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(RecordId::new(s.clone())),
        Value::Number(n) => Some(RecordId::new(n.to_string())),
        _ => None,
    }
}

/// Converts a JSON value into a cell string. `null` becomes empty.
pub(crate) fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A row in the merged record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    id: RecordId,
    fields: FieldValues,
    origin: Origin,
}

impl Row {
    /// Creates a row whose fields are projected onto the schema: every schema
    /// field is present (missing ones are empty) and unknown keys are dropped.
    pub fn new(schema: &EntitySchema, id: RecordId, fields: &FieldValues, origin: Origin) -> Self {
        Self {
            id,
            fields: schema.project(fields),
            origin,
        }
    }

    pub fn from_source(schema: &EntitySchema, record: SourceRecord, origin: Origin) -> Self {
        Self::new(schema, record.id, &record.fields, origin)
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn fields(&self) -> &FieldValues {
        &self.fields
    }

    /// Cell value, empty if the field is absent.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    /// Value of the schema's display field (`id` resolves to the row id).
    pub fn display_value(&self, schema: &EntitySchema) -> &str {
        if schema.display_field == "id" {
            self.id.as_str()
        } else {
            self.get(&schema.display_field)
        }
    }

    /// Overwrites schema fields present in `updated`. Origin is untouched.
    pub(crate) fn patch(&mut self, schema: &EntitySchema, updated: &FieldValues) {
        for (field, value) in updated {
            if schema.is_editable(field) {
                self.fields.insert(field.clone(), value.clone());
            }
        }
    }
}
