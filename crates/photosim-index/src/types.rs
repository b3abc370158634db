//! Indexing job types.

use serde::{Deserialize, Serialize};

/// A photo to index: its stable identity and where to read it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub id: String,
    pub location: String,
}

impl PhotoRef {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }
}

/// Lifecycle phase of the coordinator's job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Idle,
    Running,
    Completed,
}

/// Progress notification. `completed` never decreases within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// Set on the last notification of a job.
    pub finished: bool,
}

/// Snapshot of the coordinator's job slot.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub phase: JobPhase,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub cancel_requested: bool,
}

/// Outcome of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Always `Completed`.
    pub phase: JobPhase,
    pub total: usize,
    /// Photos embedded and stored.
    pub completed: usize,
    /// Photos whose preprocessing or embedding failed.
    pub skipped: usize,
    /// Whether the job stopped early on a cancellation request.
    pub cancelled: bool,
}

impl JobReport {
    /// True when every submitted photo made it into the store.
    pub fn all_succeeded(&self) -> bool {
        self.completed == self.total
    }
}
