//! Outcome events emitted to the presentation layer.

use serde::Serialize;

use crate::row::Origin;

/// Whether external rows are merged into the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SyncMode {
    On,
    #[default]
    Off,
}

impl SyncMode {
    pub fn is_on(&self) -> bool {
        matches!(self, SyncMode::On)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Success,
    Warning,
}

/// How long the presentation layer should keep the notice on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Persistence {
    Transient,
    Sticky,
}

/// Result of one user-visible action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub severity: Severity,
    pub persistence: Persistence,
    pub title: String,
    pub message: String,
}

impl Outcome {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            severity: Severity::Success,
            persistence: Persistence::Transient,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn failure(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            severity: Severity::Warning,
            persistence: Persistence::Sticky,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Event broadcast by a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncEvent {
    RecordSetChanged { len: usize },
    FilteredViewChanged { len: usize },
    SyncModeChanged { mode: SyncMode },
    SaveResult(Outcome),
    DeleteResult(Outcome),
    CreateResult(Outcome),
    ExternalLoadResult(Outcome),
    FetchFailed { origin: Origin, message: String },
    PendingChangeAvailable { message: String },
    PendingChangeApplied(Outcome),
}
