//! Per-row draft tracking.
//!
//! Each row in the record set has an *original* snapshot (the editable values
//! at the last reconciliation point) and a *draft* that field edits mutate.
//! A row is dirty while the two differ in any editable field. The origin
//! marker is never part of either map, so it can never leak into a delta.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DraftError;
use crate::row::{FieldValues, RecordId, Row};
use crate::schema::EntitySchema;

#[derive(Debug, Clone)]
struct DraftEntry {
    original: FieldValues,
    draft: FieldValues,
    dirty: bool,
}

impl DraftEntry {
    fn from_row(schema: &EntitySchema, row: &Row) -> Self {
        let original = schema.project(row.fields());
        Self {
            draft: original.clone(),
            original,
            dirty: false,
        }
    }
}

/// Baseline vs. in-progress edit state for every row in the record set.
#[derive(Debug)]
pub struct DraftTracker {
    schema: Arc<EntitySchema>,
    entries: HashMap<RecordId, DraftEntry>,
}

impl DraftTracker {
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self {
            schema,
            entries: HashMap::new(),
        }
    }

    /// Discards all drafts and snapshots every row afresh.
    pub fn reconfigure<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) {
        self.entries.clear();
        for row in rows {
            self.entries
                .insert(row.id().clone(), DraftEntry::from_row(&self.schema, row));
        }
    }

    /// Re-snapshots a single row, dropping its draft.
    pub fn reset_row(&mut self, row: &Row) {
        self.entries
            .insert(row.id().clone(), DraftEntry::from_row(&self.schema, row));
    }

    /// Forgets a row that left the record set.
    pub fn remove(&mut self, id: &RecordId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Edits one draft field and returns the row's new dirty state.
    pub fn set_field(
        &mut self,
        id: &RecordId,
        field: &str,
        value: impl Into<String>,
    ) -> Result<bool, DraftError> {
        if field == self.schema.origin_field {
            return Err(DraftError::ReadOnlyField {
                field: field.to_string(),
            });
        }
        if !self.schema.is_editable(field) {
            return Err(DraftError::UnknownField {
                field: field.to_string(),
            });
        }
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| DraftError::UnknownRow(id.clone()))?;

        entry.draft.insert(field.to_string(), value.into());
        entry.dirty = entry.draft != entry.original;
        Ok(entry.dirty)
    }

    pub fn is_dirty(&self, id: &RecordId) -> bool {
        self.entries.get(id).is_some_and(|e| e.dirty)
    }

    /// Save affordance: enabled only for dirty rows.
    pub fn can_save(&self, id: &RecordId) -> bool {
        self.is_dirty(id)
    }

    /// Fields whose draft differs from the original. Does not clear dirtiness.
    pub fn commit(&self, id: &RecordId) -> Option<FieldValues> {
        let entry = self.entries.get(id)?;
        Some(
            entry
                .draft
                .iter()
                .filter(|(field, value)| entry.original.get(*field) != Some(*value))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn draft(&self, id: &RecordId) -> Option<&FieldValues> {
        self.entries.get(id).map(|e| &e.draft)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
