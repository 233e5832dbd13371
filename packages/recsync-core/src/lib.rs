//! Dual-source record synchronization.
//!
//! Blends a local authoritative record set with a remotely mirrored one
//! under a toggleable sync mode, tracks optimistic edits against a
//! per-row baseline, routes mutations by row origin, and reconciles
//! pushed remote-change notifications through an explicit accept step.

pub mod adapter;
pub mod config;
pub mod controller;
pub mod draft;
pub mod error;
pub mod event;
pub mod notification;
pub mod record_set;
pub mod row;
pub mod schema;

pub use adapter::{LocalAdapter, NotificationChannel, RemoteAdapter};
pub use config::SessionConfig;
pub use controller::SyncController;
pub use draft::DraftTracker;
pub use error::{normalize_error, AdapterError, Result, SyncError};
pub use event::{Outcome, OutcomeStatus, Persistence, Severity, SyncEvent, SyncMode};
pub use notification::{ChangeNotificationHandler, ChangeOperation, PendingChange};
pub use record_set::{RecordSet, SearchFilter};
pub use row::{FieldValues, Origin, RecordId, Row, SourceRecord};
pub use schema::EntitySchema;
