//! Interfaces to the two record sources and the push channel.
//!
//! Transport, authentication and timeouts live behind these traits; the
//! controller never retries or times out on its own.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::AdapterError;
use crate::row::{FieldValues, RecordId, SourceRecord};
use crate::schema::EntitySchema;

pub use memory::{AdapterCall, AdapterOp, MemoryChannel, MemoryLocalAdapter, MemoryRemoteAdapter};

/// Canonical access to the local authoritative source.
#[async_trait]
pub trait LocalAdapter: Send + Sync {
    /// Lists every record of the entity.
    async fn fetch_all(&self, schema: &EntitySchema) -> Result<Vec<SourceRecord>, AdapterError>;

    /// Creates a record and returns its new id.
    async fn create(&self, fields: &FieldValues) -> Result<RecordId, AdapterError>;

    async fn update(&self, id: &RecordId, fields: &FieldValues) -> Result<(), AdapterError>;

    async fn delete(&self, id: &RecordId) -> Result<(), AdapterError>;
}

/// Access to the remote mirrored source. Remote creation is not supported.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Lists every remote record. Assumed to be expensive.
    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, AdapterError>;

    /// Updates a record and returns its field values as stored remotely.
    async fn update(&self, id: &RecordId, fields: &FieldValues)
        -> Result<FieldValues, AdapterError>;

    async fn delete(&self, id: &RecordId) -> Result<(), AdapterError>;
}

/// Opaque handle identifying one channel subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// An active subscription: its handle plus the stream of raw payloads.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub messages: mpsc::UnboundedReceiver<Value>,
}

/// Asynchronous push channel delivering remote change notifications.
///
/// Delivery is at-least-once and unordered relative to mutations.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, AdapterError>;

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), AdapterError>;
}
