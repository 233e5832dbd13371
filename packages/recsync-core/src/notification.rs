//! Remote change notifications.
//!
//! A push channel announces records that changed at their source. The
//! handler keeps at most one [`PendingChange`]; a newer message replaces an
//! unaccepted one. Nothing touches the record set until [`accept`] is called.
//!
//! The listener task runs alongside user-driven operations. A notification
//! and a user save touching the same row may interleave in any order; the
//! last write wins.
//!
//! [`accept`]: ChangeNotificationHandler::accept

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::adapter::{NotificationChannel, SubscriptionHandle};
use crate::controller::SyncController;
use crate::error::{AdapterError, ApplyError, NotificationDecodeError};
use crate::event::{Outcome, SyncEvent};
use crate::row::{json_cell, json_id, FieldValues, RecordId};

const APPLY_FALLBACK: &str = "Change cannot be applied.";

/// Operation announced by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Update,
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Update => f.write_str("UPDATE"),
            ChangeOperation::Delete => f.write_str("DELETE"),
        }
    }
}

/// Wire shape of a notification payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeMessage {
    object_name: Option<String>,
    operation: String,
    record_id: Option<Value>,
    record_name: Option<String>,
    #[serde(default)]
    fields: Option<serde_json::Map<String, Value>>,
}

/// A decoded remote change awaiting acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub object_name: Option<String>,
    pub operation: ChangeOperation,
    pub row_id: RecordId,
    pub fields: FieldValues,
    pub display_name: String,
}

impl PendingChange {
    /// Decodes a raw push payload.
    pub fn decode(payload: &Value) -> Result<Self, NotificationDecodeError> {
        let message = ChangeMessage::deserialize(payload)
            .map_err(|e| NotificationDecodeError::Malformed(e.to_string()))?;

        let operation = match message.operation.to_ascii_uppercase().as_str() {
            "UPDATE" => ChangeOperation::Update,
            "DELETE" => ChangeOperation::Delete,
            _ => return Err(NotificationDecodeError::UnknownOperation(message.operation)),
        };
        let row_id = message
            .record_id
            .as_ref()
            .and_then(json_id)
            .ok_or(NotificationDecodeError::MissingRecordId)?;
        let fields = message
            .fields
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| (k.clone(), json_cell(v)))
            .collect();
        let display_name = message
            .record_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| row_id.to_string());

        Ok(Self {
            object_name: message.object_name,
            operation,
            row_id,
            fields,
            display_name,
        })
    }

    /// Human-readable prompt for the presentation layer.
    pub fn prompt(&self, entity: &str) -> String {
        let verb = match self.operation {
            ChangeOperation::Update => "updated",
            ChangeOperation::Delete => "deleted",
        };
        format!("{} '{}' was {} externally.", entity, self.display_name, verb)
    }
}

struct ActiveSubscription {
    channel: Arc<dyn NotificationChannel>,
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Holds the single pending remote change and applies it on request.
pub struct ChangeNotificationHandler {
    controller: Arc<SyncController>,
    pending: Mutex<Option<PendingChange>>,
    subscription: Mutex<Option<ActiveSubscription>>,
}

impl ChangeNotificationHandler {
    pub fn new(controller: Arc<SyncController>) -> Arc<Self> {
        Arc::new(Self {
            controller,
            pending: Mutex::new(None),
            subscription: Mutex::new(None),
        })
    }

    /// Subject notifications must name to be considered.
    pub fn subject(&self) -> &str {
        &self.controller.schema().name
    }

    /// Subscribes to `topic` and feeds every message into
    /// [`on_message`](Self::on_message) from a background task.
    /// Subscribing twice is a no-op.
    pub async fn listen(
        self: &Arc<Self>,
        channel: Arc<dyn NotificationChannel>,
        topic: &str,
    ) -> Result<(), AdapterError> {
        if self.subscription.lock().is_some() {
            return Ok(());
        }
        let mut subscription = channel.subscribe(topic).await?;
        let handler = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(payload) = subscription.messages.recv().await {
                handler.on_message(&payload);
            }
            tracing::debug!("Notification stream closed");
        });
        tracing::info!("Listening for {} changes on {}", self.subject(), topic);

        let previous = self.subscription.lock().replace(ActiveSubscription {
            channel,
            handle: subscription.handle,
            task,
        });
        if let Some(previous) = previous {
            // Lost a race with a concurrent listen() call.
            previous.task.abort();
            let _ = previous.channel.unsubscribe(previous.handle).await;
        }
        Ok(())
    }

    /// Stops listening and forgets any pending change.
    pub async fn teardown(&self) {
        let active = self.subscription.lock().take();
        if let Some(active) = active {
            active.task.abort();
            if let Err(e) = active.channel.unsubscribe(active.handle).await {
                tracing::warn!("Failed to unsubscribe: {}", e);
            }
        }
        self.pending.lock().take();
    }

    /// Handles one raw payload. Returns true if it became the pending change.
    ///
    /// Payloads for another subject are ignored; malformed ones are logged
    /// and dropped. A message without a subject is accepted.
    pub fn on_message(&self, payload: &Value) -> bool {
        if self.controller.is_closed() {
            return false;
        }
        let change = match PendingChange::decode(payload) {
            Ok(change) => change,
            Err(e) => {
                tracing::warn!("Dropping notification: {}", e);
                return false;
            }
        };
        if let Some(object) = &change.object_name {
            if object != self.subject() {
                tracing::debug!("Ignoring notification for {}", object);
                return false;
            }
        }

        let prompt = change.prompt(self.subject());
        tracing::debug!("Pending {} for {}", change.operation, change.row_id);
        if let Some(replaced) = self.pending.lock().replace(change) {
            tracing::debug!("Replaced unaccepted change for {}", replaced.row_id);
        }
        self.controller
            .emit(SyncEvent::PendingChangeAvailable { message: prompt });
        true
    }

    pub fn pending(&self) -> Option<PendingChange> {
        self.pending.lock().clone()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Applies the pending change.
    ///
    /// DELETE removes the row from the record set directly; the source has
    /// already dropped it. UPDATE writes the editable subset of the payload
    /// through the local source and refreshes. A failed UPDATE stays pending
    /// so it can be retried. Returns `None` when nothing is pending.
    pub async fn accept(&self) -> Option<Outcome> {
        let change = self.pending()?;
        if self.controller.is_closed() {
            return None;
        }

        let outcome = match change.operation {
            ChangeOperation::Delete => {
                let removed = self.controller.remove_row(&change.row_id)?;
                if !removed {
                    tracing::debug!("Row {} already gone", change.row_id);
                }
                self.clear_if_current(&change);
                tracing::info!("Applied external delete of {}", change.row_id);
                Outcome::success("Change applied", format!("{} removed.", change.display_name))
            }
            ChangeOperation::Update => match self.apply_update(&change).await {
                Ok(()) => {
                    self.clear_if_current(&change);
                    tracing::info!("Applied external update of {}", change.row_id);
                    Outcome::success(
                        "Change applied",
                        format!("{} updated.", change.display_name),
                    )
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    Outcome::failure("Change not applied", e.message)
                }
            },
        };
        if self.controller.is_closed() {
            return None;
        }
        self.controller
            .emit(SyncEvent::PendingChangeApplied(outcome.clone()));
        Some(outcome)
    }

    async fn apply_update(&self, change: &PendingChange) -> Result<(), ApplyError> {
        let fields = self.controller.schema().filter_editable(&change.fields);
        if fields.is_empty() {
            // Nothing editable changed; refresh so the view reflects the source.
            tracing::debug!("Change for {} carries no editable fields", change.row_id);
            let _ = self.controller.load_internal().await;
            return Ok(());
        }
        self.controller
            .update_local(&change.row_id, &fields, APPLY_FALLBACK)
            .await
            .map_err(|e| ApplyError {
                row_id: change.row_id.clone(),
                message: e.message,
            })
    }

    /// Clears the pending slot unless a newer message replaced it meanwhile.
    fn clear_if_current(&self, applied: &PendingChange) {
        let mut pending = self.pending.lock();
        if pending.as_ref() == Some(applied) {
            *pending = None;
        }
    }
}
