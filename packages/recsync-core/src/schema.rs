//! Entity schema: the ordered, statically configured list of editable fields.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::row::FieldValues;

fn default_display_field() -> String {
    "Name".to_string()
}

fn default_origin_field() -> String {
    "Mode".to_string()
}

/// Field configuration for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity name, also the subject used to filter push notifications
    pub name: String,
    /// Editable fields in display order
    pub fields: Vec<String>,
    /// Field searched by the filter (default: "Name")
    #[serde(default = "default_display_field")]
    pub display_field: String,
    /// Column name of the read-only origin marker (default: "Mode")
    #[serde(default = "default_origin_field")]
    pub origin_field: String,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
            display_field: default_display_field(),
            origin_field: default_origin_field(),
        }
    }

    pub fn with_display_field(mut self, field: impl Into<String>) -> Self {
        self.display_field = field.into();
        self
    }

    pub fn with_origin_field(mut self, field: impl Into<String>) -> Self {
        self.origin_field = field.into();
        self
    }

    /// Account preset.
    pub fn account() -> Self {
        Self::new(
            "Account",
            vec![
                "Name".to_string(),
                "Phone".to_string(),
                "NumberOfEmployees".to_string(),
            ],
        )
    }

    /// Lead preset, searched by last name.
    pub fn lead() -> Self {
        Self::new(
            "Lead",
            vec![
                "FirstName".to_string(),
                "LastName".to_string(),
                "Company".to_string(),
                "Phone".to_string(),
            ],
        )
        .with_display_field("LastName")
    }

    /// True if `field` is an editable schema field (never the origin marker).
    pub fn is_editable(&self, field: &str) -> bool {
        field != self.origin_field && self.fields.iter().any(|f| f == field)
    }

    /// Returns every schema field, taking values from `raw` and defaulting to "".
    pub fn project(&self, raw: &FieldValues) -> FieldValues {
        self.fields
            .iter()
            .map(|f| (f.clone(), raw.get(f).cloned().unwrap_or_default()))
            .collect()
    }

    /// Keeps only the editable schema fields present in `raw`.
    pub fn filter_editable(&self, raw: &FieldValues) -> FieldValues {
        raw.iter()
            .filter(|(field, _)| self.is_editable(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidSchema("entity name is empty".to_string()));
        }
        if self.fields.is_empty() {
            return Err(ConfigError::InvalidSchema(format!(
                "entity '{}' has no fields",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.is_empty() || field == "id" {
                return Err(ConfigError::InvalidSchema(format!(
                    "invalid field name '{}'",
                    field
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(ConfigError::InvalidSchema(format!(
                    "duplicate field '{}'",
                    field
                )));
            }
        }
        if seen.contains(self.origin_field.as_str()) {
            return Err(ConfigError::InvalidSchema(format!(
                "origin marker '{}' cannot be an editable field",
                self.origin_field
            )));
        }
        if self.display_field != "id" && !seen.contains(self.display_field.as_str()) {
            return Err(ConfigError::InvalidSchema(format!(
                "display field '{}' is not a schema field",
                self.display_field
            )));
        }
        Ok(())
    }
}
