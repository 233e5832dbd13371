//! Error types and adapter error normalization.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::row::{Origin, RecordId};

/// Structured failure returned by a record adapter.
///
/// Adapters fill in whatever their backend reports: per-field validation
/// messages, a list of generic errors, and/or a transport-level message.
/// Use [`normalize_error`] to turn it into a single user-facing string.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", self.message.as_deref().unwrap_or("adapter error"))]
pub struct AdapterError {
    /// Per-field validation errors (field name -> messages)
    pub field_errors: BTreeMap<String, Vec<String>>,
    /// Generic structured errors reported by the backend
    pub errors: Vec<String>,
    /// Adapter-level message (transport, timeout, ...)
    pub message: Option<String>,
}

impl AdapterError {
    /// Creates an error carrying only an adapter-level message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Creates an error carrying a single generic structured error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Default::default()
        }
    }

    /// Adds a per-field error.
    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Adds a generic structured error.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.errors.push(message.into());
        self
    }
}

/// Reduces an adapter error to one message.
///
/// Precedence: first per-field error, then first generic error, then the
/// adapter-level message, then `fallback`. Empty strings are skipped.
pub fn normalize_error(err: &AdapterError, fallback: &str) -> String {
    err.field_errors
        .values()
        .flat_map(|messages| messages.iter())
        .find(|m| !m.is_empty())
        .or_else(|| err.errors.iter().find(|m| !m.is_empty()))
        .or_else(|| err.message.as_ref().filter(|m| !m.is_empty()))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// Listing failure against either source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{origin} fetch failed: {message}")]
pub struct FetchError {
    pub origin: Origin,
    pub message: String,
}

/// Kind of mutation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Create/update/delete failure with an already normalized message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct MutationError {
    pub operation: MutationKind,
    pub message: String,
}

/// Push payload that could not be decoded into a pending change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationDecodeError {
    /// Payload is not an object of the expected shape
    #[error("Malformed notification payload: {0}")]
    Malformed(String),

    /// Operation is neither UPDATE nor DELETE
    #[error("Unknown notification operation '{0}'")]
    UnknownOperation(String),

    /// Record id missing or empty
    #[error("Notification is missing a record id")]
    MissingRecordId,
}

/// Accepting a pending change failed; the change stays pending.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Change for record {row_id} could not be applied: {message}")]
pub struct ApplyError {
    pub row_id: RecordId,
    pub message: String,
}

/// Invalid draft edit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    /// No draft is tracked for this row
    #[error("Row '{0}' is not in the record set")]
    UnknownRow(RecordId),

    /// Field is not part of the entity schema
    #[error("Field '{field}' is not part of the schema")]
    UnknownField { field: String },

    /// Field is the origin marker
    #[error("Field '{field}' is read-only")]
    ReadOnlyField { field: String },
}

/// Configuration loading or validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(String),

    #[error("Invalid TOML: {0}")]
    Parse(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidOverride { var: String, value: String },
}

/// Crate-level error for fallible setup paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
