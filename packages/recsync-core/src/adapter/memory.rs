//! In-process adapters backed by plain vectors.
//!
//! Every call is recorded, and a failure can be armed per operation; it fires
//! on the next call of that operation only.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    LocalAdapter, NotificationChannel, RemoteAdapter, Subscription, SubscriptionHandle,
};
use crate::error::AdapterError;
use crate::row::{FieldValues, RecordId, SourceRecord};
use crate::schema::EntitySchema;

/// Adapter operation, used to arm failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterOp {
    FetchAll,
    Create,
    Update,
    Delete,
}

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    FetchAll,
    Create(FieldValues),
    Update(RecordId, FieldValues),
    Delete(RecordId),
}

#[derive(Debug, Default)]
struct MemoryStore {
    records: Vec<SourceRecord>,
    calls: Vec<AdapterCall>,
    failures: HashMap<AdapterOp, AdapterError>,
    next_id: u64,
}

impl MemoryStore {
    fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            next_id: records.len() as u64 + 1,
            records,
            ..Default::default()
        }
    }

    fn begin(&mut self, op: AdapterOp, call: AdapterCall) -> Result<(), AdapterError> {
        self.calls.push(call);
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn update(&mut self, id: &RecordId, fields: &FieldValues) -> Result<FieldValues, AdapterError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| AdapterError::generic(format!("Record {} does not exist", id)))?;
        for (field, value) in fields {
            record.fields.insert(field.clone(), value.clone());
        }
        Ok(record.fields.clone())
    }

    fn delete(&mut self, id: &RecordId) -> Result<(), AdapterError> {
        let before = self.records.len();
        self.records.retain(|r| &r.id != id);
        if self.records.len() == before {
            return Err(AdapterError::generic(format!("Record {} does not exist", id)));
        }
        Ok(())
    }
}

fn records_from_json(value: &Value) -> Result<Vec<SourceRecord>, AdapterError> {
    let items = value
        .as_array()
        .ok_or_else(|| AdapterError::message("dataset must be a JSON array"))?;
    items
        .iter()
        .map(|item| {
            SourceRecord::from_json(item)
                .ok_or_else(|| AdapterError::message(format!("invalid record: {}", item)))
        })
        .collect()
}

macro_rules! memory_adapter_common {
    ($ty:ident) => {
        impl $ty {
            pub fn new(records: Vec<SourceRecord>) -> Self {
                Self {
                    store: Mutex::new(MemoryStore::new(records)),
                }
            }

            /// Loads a dataset from a JSON array of objects.
            pub fn from_json(value: &Value) -> Result<Self, AdapterError> {
                Ok(Self::new(records_from_json(value)?))
            }

            pub fn records(&self) -> Vec<SourceRecord> {
                self.store.lock().records.clone()
            }

            pub fn record(&self, id: &RecordId) -> Option<SourceRecord> {
                self.store.lock().records.iter().find(|r| &r.id == id).cloned()
            }

            /// Replaces the dataset without recording a call.
            pub fn set_records(&self, records: Vec<SourceRecord>) {
                self.store.lock().records = records;
            }

            pub fn calls(&self) -> Vec<AdapterCall> {
                self.store.lock().calls.clone()
            }

            pub fn clear_calls(&self) {
                self.store.lock().calls.clear();
            }

            /// Makes the next `op` call fail with `err`.
            pub fn fail_next(&self, op: AdapterOp, err: AdapterError) {
                self.store.lock().failures.insert(op, err);
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new(Vec::new())
            }
        }
    };
}

/// In-memory local source.
#[derive(Debug)]
pub struct MemoryLocalAdapter {
    store: Mutex<MemoryStore>,
}

memory_adapter_common!(MemoryLocalAdapter);

#[async_trait]
impl LocalAdapter for MemoryLocalAdapter {
    async fn fetch_all(&self, _schema: &EntitySchema) -> Result<Vec<SourceRecord>, AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::FetchAll, AdapterCall::FetchAll)?;
        Ok(store.records.clone())
    }

    async fn create(&self, fields: &FieldValues) -> Result<RecordId, AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::Create, AdapterCall::Create(fields.clone()))?;
        let id = RecordId::new(format!("new-{}", store.next_id));
        store.next_id += 1;
        store.records.push(SourceRecord::new(id.clone(), fields.clone()));
        Ok(id)
    }

    async fn update(&self, id: &RecordId, fields: &FieldValues) -> Result<(), AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::Update, AdapterCall::Update(id.clone(), fields.clone()))?;
        store.update(id, fields).map(|_| ())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::Delete, AdapterCall::Delete(id.clone()))?;
        store.delete(id)
    }
}

/// In-memory remote source.
#[derive(Debug)]
pub struct MemoryRemoteAdapter {
    store: Mutex<MemoryStore>,
}

memory_adapter_common!(MemoryRemoteAdapter);

#[async_trait]
impl RemoteAdapter for MemoryRemoteAdapter {
    async fn fetch_all(&self) -> Result<Vec<SourceRecord>, AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::FetchAll, AdapterCall::FetchAll)?;
        Ok(store.records.clone())
    }

    async fn update(
        &self,
        id: &RecordId,
        fields: &FieldValues,
    ) -> Result<FieldValues, AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::Update, AdapterCall::Update(id.clone(), fields.clone()))?;
        store.update(id, fields)
    }

    async fn delete(&self, id: &RecordId) -> Result<(), AdapterError> {
        let mut store = self.store.lock();
        store.begin(AdapterOp::Delete, AdapterCall::Delete(id.clone()))?;
        store.delete(id)
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    next_handle: u64,
    subscribers: HashMap<u64, (String, mpsc::UnboundedSender<Value>)>,
}

/// In-process topic hub.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    state: Mutex<ChannelState>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `payload` to every subscriber of `topic` and returns how many
    /// received it.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        let mut state = self.state.lock();
        // Receivers dropped without unsubscribing are pruned here.
        state.subscribers.retain(|_, (_, tx)| !tx.is_closed());
        state
            .subscribers
            .values()
            .filter(|(t, _)| t == topic)
            .filter(|(_, tx)| tx.send(payload.clone()).is_ok())
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, AdapterError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.subscribers.insert(handle, (topic.to_string(), tx));
        Ok(Subscription {
            handle: SubscriptionHandle(handle),
            messages: rx,
        })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), AdapterError> {
        self.state
            .lock()
            .subscribers
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| AdapterError::message(format!("unknown subscription {}", handle.0)))
    }
}
