//! Merged record set and search filtering.

use std::collections::HashSet;

use crate::row::{FieldValues, Origin, RecordId, Row};
use crate::schema::EntitySchema;

/// Ordered rows from both sources: the Internal partition first, then the
/// External partition, each in the order its source returned them.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    rows: Vec<Row>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id() == id)
    }

    /// Replaces the Internal partition, keeping the External one in place.
    ///
    /// Duplicate ids within `rows` keep their first occurrence. An External
    /// row whose id collides with an incoming Internal row is evicted.
    pub fn replace_internal(&mut self, rows: Vec<Row>) {
        let internal = dedup(rows, Origin::Internal, &HashSet::new());
        let taken: HashSet<RecordId> = internal.iter().map(|r| r.id().clone()).collect();
        let external = self
            .rows
            .drain(..)
            .filter(|r| r.origin() == Origin::External)
            .filter(|r| {
                let keep = !taken.contains(r.id());
                if !keep {
                    tracing::warn!("External row {} shadowed by internal row", r.id());
                }
                keep
            })
            .collect::<Vec<_>>();
        self.rows = internal;
        self.rows.extend(external);
    }

    /// Replaces the External partition. Rows colliding with an Internal id are
    /// dropped.
    pub fn replace_external(&mut self, rows: Vec<Row>) {
        self.rows.retain(|r| r.origin() == Origin::Internal);
        let taken: HashSet<RecordId> = self.rows.iter().map(|r| r.id().clone()).collect();
        let external = dedup(rows, Origin::External, &taken);
        self.rows.extend(external);
    }

    /// Drops every External row.
    pub fn clear_external(&mut self) {
        self.rows.retain(|r| r.origin() == Origin::Internal);
    }

    /// Patches one row in place and returns it.
    pub fn patch(
        &mut self,
        schema: &EntitySchema,
        id: &RecordId,
        updated: &FieldValues,
    ) -> Option<&Row> {
        let row = self.rows.iter_mut().find(|r| r.id() == id)?;
        row.patch(schema, updated);
        Some(row)
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<Row> {
        let index = self.rows.iter().position(|r| r.id() == id)?;
        Some(self.rows.remove(index))
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Rows matching `filter`, in record set order.
    pub fn filtered(&self, filter: &SearchFilter, schema: &EntitySchema) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|r| filter.matches(r, schema))
            .cloned()
            .collect()
    }
}

fn dedup(rows: Vec<Row>, origin: Origin, taken: &HashSet<RecordId>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| r.origin() == origin)
        .filter(|r| {
            if taken.contains(r.id()) || !seen.insert(r.id().clone()) {
                tracing::warn!("Dropping duplicate {} row {}", origin, r.id());
                return false;
            }
            true
        })
        .collect()
}

/// Case-insensitive substring filter over the display field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    term: String,
}

impl SearchFilter {
    pub fn new(term: &str) -> Self {
        Self {
            term: term.to_lowercase(),
        }
    }

    /// Lowercased search term.
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn matches(&self, row: &Row, schema: &EntitySchema) -> bool {
        self.term.is_empty() || row.display_value(schema).to_lowercase().contains(&self.term)
    }
}
