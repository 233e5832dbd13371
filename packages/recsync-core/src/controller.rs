//! Synchronization controller.
//!
//! Owns one session's merged record set, sync mode, search filter and drafts,
//! and routes every mutation to the source the row came from.
//!
//! Operations are independent async units. State lives behind a short-lived
//! lock that is never held across an adapter call, so each invocation applies
//! its result atomically but two invocations may interleave freely
//! (last write wins). Results that arrive after [`SyncController::teardown`]
//! are discarded.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::adapter::{LocalAdapter, RemoteAdapter};
use crate::config::SessionConfig;
use crate::draft::DraftTracker;
use crate::error::{normalize_error, DraftError, FetchError, MutationError, MutationKind};
use crate::event::{Outcome, SyncEvent, SyncMode};
use crate::record_set::{RecordSet, SearchFilter};
use crate::row::{FieldValues, Origin, RecordId, Row};
use crate::schema::EntitySchema;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

const LOAD_INTERNAL_FALLBACK: &str = "Record data cannot be loaded.";
const LOAD_EXTERNAL_FALLBACK: &str = "External data cannot be loaded.";
const CREATE_FALLBACK: &str = "Record cannot be created.";
const UPDATE_FALLBACK: &str = "Record cannot be updated.";
const UPDATE_EXTERNAL_FALLBACK: &str = "External record cannot be updated.";
const DELETE_FALLBACK: &str = "Record cannot be deleted.";
const DELETE_EXTERNAL_FALLBACK: &str = "External record cannot be deleted.";

/// Which published snapshots a state change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Touched {
    Records,
    Filter,
}

struct ControllerState {
    records: RecordSet,
    drafts: DraftTracker,
    filter: SearchFilter,
    mode: SyncMode,
    /// Bumped on every sync-mode change; stale remote listings compare it.
    mode_epoch: u64,
    closed: bool,
}

/// Per-session controller merging the local and remote record sources.
pub struct SyncController {
    schema: Arc<EntitySchema>,
    local: Arc<dyn LocalAdapter>,
    remote: Arc<dyn RemoteAdapter>,
    state: Mutex<ControllerState>,
    /// Published snapshot of the record set
    records: ArcSwap<Vec<Row>>,
    /// Published snapshot of the filtered view
    view: ArcSwap<Vec<Row>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncController {
    /// Creates a controller with an empty record set and sync mode off.
    pub fn new(
        schema: EntitySchema,
        local: Arc<dyn LocalAdapter>,
        remote: Arc<dyn RemoteAdapter>,
    ) -> Self {
        Self::with_event_capacity(schema, local, remote, DEFAULT_EVENT_CAPACITY)
    }

    pub fn from_config(
        config: &SessionConfig,
        local: Arc<dyn LocalAdapter>,
        remote: Arc<dyn RemoteAdapter>,
    ) -> Self {
        Self::with_event_capacity(config.entity.clone(), local, remote, config.event_capacity)
    }

    pub fn with_event_capacity(
        schema: EntitySchema,
        local: Arc<dyn LocalAdapter>,
        remote: Arc<dyn RemoteAdapter>,
        event_capacity: usize,
    ) -> Self {
        let schema = Arc::new(schema);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(ControllerState {
                records: RecordSet::new(),
                drafts: DraftTracker::new(schema.clone()),
                filter: SearchFilter::default(),
                mode: SyncMode::Off,
                mode_epoch: 0,
                closed: false,
            }),
            schema,
            local,
            remote,
            records: ArcSwap::from_pointee(Vec::new()),
            view: ArcSwap::from_pointee(Vec::new()),
            events,
        }
    }

    /// Subscribes to the session's outcome events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.state.lock().mode
    }

    /// Current record set, Internal rows first.
    pub fn records(&self) -> Arc<Vec<Row>> {
        self.records.load_full()
    }

    /// Rows matching the current search, in record set order.
    pub fn filtered_view(&self) -> Arc<Vec<Row>> {
        self.view.load_full()
    }

    pub fn row(&self, id: &RecordId) -> Option<Row> {
        self.state.lock().records.get(id).cloned()
    }

    pub fn search_term(&self) -> String {
        self.state.lock().filter.term().to_string()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Fetches the canonical set and replaces the Internal partition.
    ///
    /// With sync mode on, the External partition is kept as is. Concurrent
    /// calls are not coalesced; each one replaces the partition with its own
    /// result. A failed fetch empties the Internal partition.
    pub async fn load_internal(&self) -> Result<usize, FetchError> {
        let fetched = self.local.fetch_all(&self.schema).await;
        match fetched {
            Ok(records) => {
                let rows: Vec<Row> = records
                    .into_iter()
                    .map(|r| Row::from_source(&self.schema, r, Origin::Internal))
                    .collect();
                let count = rows.len();
                let applied = self.mutate(Touched::Records, |state| {
                    state.records.replace_internal(rows);
                    if !state.mode.is_on() {
                        state.records.clear_external();
                    }
                    state.drafts.reconfigure(state.records.rows());
                });
                if applied.is_none() {
                    tracing::debug!("Session closed, dropping internal fetch result");
                    return Ok(0);
                }
                tracing::debug!("Loaded {} internal {} rows", count, self.schema.name);
                Ok(count)
            }
            Err(err) => {
                let message = normalize_error(&err, LOAD_INTERNAL_FALLBACK);
                tracing::warn!("Internal fetch for {} failed: {}", self.schema.name, message);
                let applied = self.mutate(Touched::Records, |state| {
                    state.records.replace_internal(Vec::new());
                    state.drafts.reconfigure(state.records.rows());
                });
                if applied.is_some() {
                    self.emit(SyncEvent::FetchFailed {
                        origin: Origin::Internal,
                        message: message.clone(),
                    });
                }
                Err(FetchError {
                    origin: Origin::Internal,
                    message,
                })
            }
        }
    }

    /// Turns sync mode on or off.
    ///
    /// `On` lists the remote source and installs the result as the External
    /// partition; on failure the mode stays on with an empty External
    /// partition. `Off` drops the External partition without a remote call
    /// and then refreshes the Internal partition. Returns the outcome of the
    /// remote listing, if one was reported.
    pub async fn set_sync_mode(&self, mode: SyncMode) -> Option<Outcome> {
        let epoch = self.mutate(Touched::Records, |state| {
            state.mode = mode;
            state.mode_epoch += 1;
            if !mode.is_on() {
                state.records.clear_external();
                state.drafts.reconfigure(state.records.rows());
            }
            state.mode_epoch
        })?;
        tracing::info!("Sync mode for {} set to {:?}", self.schema.name, mode);
        self.emit(SyncEvent::SyncModeChanged { mode });

        if !mode.is_on() {
            let _ = self.load_internal().await;
            return None;
        }

        let fetched = self.remote.fetch_all().await;
        let schema = self.schema.clone();
        let applied = self.mutate(Touched::Records, |state| {
            if state.mode_epoch != epoch {
                return None;
            }
            let outcome = match fetched {
                Ok(records) => {
                    let rows: Vec<Row> = records
                        .into_iter()
                        .map(|r| Row::from_source(&schema, r, Origin::External))
                        .collect();
                    let count = rows.len();
                    state.records.replace_external(rows);
                    Outcome::success(
                        "External records loaded",
                        format!("{} records loaded from external org.", count),
                    )
                }
                Err(err) => {
                    let message = normalize_error(&err, LOAD_EXTERNAL_FALLBACK);
                    tracing::warn!("External fetch for {} failed: {}", schema.name, message);
                    state.records.clear_external();
                    Outcome::failure("External load failed", message)
                }
            };
            state.drafts.reconfigure(state.records.rows());
            Some(outcome)
        });

        match applied {
            Some(Some(outcome)) => {
                self.emit(SyncEvent::ExternalLoadResult(outcome.clone()));
                Some(outcome)
            }
            _ => {
                tracing::debug!("Dropping stale external fetch result");
                None
            }
        }
    }

    /// Filters the view by a case-insensitive substring of the display field.
    /// An empty term shows the whole record set. The term is matched as
    /// given, whitespace included.
    pub fn search(&self, term: &str) {
        let filter = SearchFilter::new(term);
        self.mutate(Touched::Filter, |state| state.filter = filter);
    }

    /// Creates a record in the local source and absorbs it by refreshing.
    pub async fn create_row(&self, fields: &FieldValues) -> Option<Outcome> {
        let fields = self.schema.filter_editable(fields);
        let result = self.local.create(&fields).await;
        if self.is_closed() {
            return None;
        }
        let outcome = match result {
            Ok(id) => {
                tracing::info!("Created {} record {}", self.schema.name, id);
                let _ = self.load_internal().await;
                Outcome::success("Create successful", "Record created successfully.")
            }
            Err(err) => {
                let message = normalize_error(&err, CREATE_FALLBACK);
                tracing::warn!("Create failed: {}", message);
                Outcome::failure("Create failed", message)
            }
        };
        self.emit(SyncEvent::CreateResult(outcome.clone()));
        Some(outcome)
    }

    /// Saves `fields` on a row, routed by the row's origin.
    ///
    /// Internal rows are updated locally and the Internal partition is then
    /// refreshed. External rows are updated remotely and patched in place
    /// from the values the remote source returns.
    ///
    /// Unknown rows, and field sets left empty once non-editable fields are
    /// dropped, return `None` without an adapter call or an outcome event.
    pub async fn update_row(&self, id: &RecordId, fields: &FieldValues) -> Option<Outcome> {
        let origin = self.origin_of(id)?;
        let fields = self.schema.filter_editable(fields);
        if fields.is_empty() {
            tracing::debug!("Ignoring empty update for {}", id);
            return None;
        }

        let outcome = match origin {
            Origin::Internal => match self.update_local(id, &fields, UPDATE_FALLBACK).await {
                Ok(()) => Outcome::success("Save successful", "Record updated successfully."),
                Err(err) => Outcome::failure("Save failed", err.message),
            },
            Origin::External => match self.remote.update(id, &fields).await {
                Ok(updated) => {
                    let schema = self.schema.clone();
                    let patched = self.mutate(Touched::Records, |state| {
                        match state.records.patch(&schema, id, &updated) {
                            Some(row) => {
                                let row = row.clone();
                                state.drafts.reset_row(&row);
                                true
                            }
                            None => false,
                        }
                    })?;
                    if !patched {
                        tracing::debug!("External row {} left the record set before patch", id);
                    }
                    Outcome::success("Save successful", "External record updated successfully.")
                }
                Err(err) => {
                    let message = normalize_error(&err, UPDATE_EXTERNAL_FALLBACK);
                    tracing::warn!("External update of {} failed: {}", id, message);
                    Outcome::failure("Save failed", message)
                }
            },
        };
        if self.is_closed() {
            return None;
        }
        self.emit(SyncEvent::SaveResult(outcome.clone()));
        Some(outcome)
    }

    /// Deletes a row, routed by the row's origin.
    ///
    /// Internal deletions refresh the Internal partition; External ones
    /// remove the row locally without relisting the remote source.
    pub async fn delete_row(&self, id: &RecordId) -> Option<Outcome> {
        let origin = self.origin_of(id)?;

        let outcome = match origin {
            Origin::Internal => match self.local.delete(id).await {
                Ok(()) => {
                    if self.is_closed() {
                        return None;
                    }
                    let _ = self.load_internal().await;
                    Outcome::success("Delete successful", "Record deleted successfully.")
                }
                Err(err) => {
                    let message = normalize_error(&err, DELETE_FALLBACK);
                    tracing::warn!("Delete of {} failed: {}", id, message);
                    Outcome::failure("Delete failed", message)
                }
            },
            Origin::External => match self.remote.delete(id).await {
                Ok(()) => {
                    self.remove_row(id)?;
                    Outcome::success("Delete successful", "External record deleted successfully.")
                }
                Err(err) => {
                    let message = normalize_error(&err, DELETE_EXTERNAL_FALLBACK);
                    tracing::warn!("External delete of {} failed: {}", id, message);
                    Outcome::failure("Delete failed", message)
                }
            },
        };
        if self.is_closed() {
            return None;
        }
        self.emit(SyncEvent::DeleteResult(outcome.clone()));
        Some(outcome)
    }

    /// Edits one draft field; returns whether the row is now dirty.
    pub fn set_field(
        &self,
        id: &RecordId,
        field: &str,
        value: impl Into<String>,
    ) -> Result<bool, DraftError> {
        self.state.lock().drafts.set_field(id, field, value)
    }

    pub fn is_dirty(&self, id: &RecordId) -> bool {
        self.state.lock().drafts.is_dirty(id)
    }

    pub fn can_save(&self, id: &RecordId) -> bool {
        self.state.lock().drafts.can_save(id)
    }

    /// Changed fields of a row's draft.
    pub fn commit(&self, id: &RecordId) -> Option<FieldValues> {
        self.state.lock().drafts.commit(id)
    }

    pub fn draft(&self, id: &RecordId) -> Option<FieldValues> {
        self.state.lock().drafts.draft(id).cloned()
    }

    /// Commits a dirty row's draft through [`update_row`](Self::update_row).
    /// Does nothing while the save affordance is disabled.
    pub async fn save_row(&self, id: &RecordId) -> Option<Outcome> {
        if !self.can_save(id) {
            return None;
        }
        let delta = self.commit(id)?;
        self.update_row(id, &delta).await
    }

    /// Closes the session. Later results and operations become no-ops.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.records.clear();
        state.drafts.clear();
        self.records.store(Arc::new(Vec::new()));
        self.view.store(Arc::new(Vec::new()));
        tracing::debug!("Sync session for {} torn down", self.schema.name);
    }

    /// Local update followed by an Internal refresh. Used for Internal saves
    /// and for accepted remote changes; `fallback` is the message reported
    /// when the adapter error carries none.
    pub(crate) async fn update_local(
        &self,
        id: &RecordId,
        fields: &FieldValues,
        fallback: &str,
    ) -> Result<(), MutationError> {
        if let Err(err) = self.local.update(id, fields).await {
            let message = normalize_error(&err, fallback);
            tracing::warn!("Local update of {} failed: {}", id, message);
            return Err(MutationError {
                operation: MutationKind::Update,
                message,
            });
        }
        if !self.is_closed() {
            let _ = self.load_internal().await;
        }
        Ok(())
    }

    /// Removes a row and its draft without touching any other row.
    /// Returns `None` once the session is closed.
    pub(crate) fn remove_row(&self, id: &RecordId) -> Option<bool> {
        self.mutate(Touched::Records, |state| {
            let removed = state.records.remove(id).is_some();
            state.drafts.remove(id);
            removed
        })
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn origin_of(&self, id: &RecordId) -> Option<Origin> {
        let origin = self.state.lock().records.get(id).map(Row::origin);
        if origin.is_none() {
            tracing::debug!("Row {} is not in the record set", id);
        }
        origin
    }

    /// Applies `f` to the state, republishes the snapshots and emits the
    /// matching change events. Returns `None` if the session is closed.
    fn mutate<R>(&self, touched: Touched, f: impl FnOnce(&mut ControllerState) -> R) -> Option<R> {
        let (result, records_len, view_len) = {
            let mut state = self.state.lock();
            if state.closed {
                return None;
            }
            let result = f(&mut *state);
            let view = state.records.filtered(&state.filter, &self.schema);
            let view_len = view.len();
            let records_len = state.records.len();
            if touched == Touched::Records {
                self.records.store(Arc::new(state.records.rows().to_vec()));
            }
            self.view.store(Arc::new(view));
            (result, records_len, view_len)
        };

        if touched == Touched::Records {
            self.emit(SyncEvent::RecordSetChanged { len: records_len });
        }
        self.emit(SyncEvent::FilteredViewChanged { len: view_len });
        Some(result)
    }
}
