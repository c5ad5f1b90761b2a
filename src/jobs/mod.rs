//! Job lifecycle: identifiers, the status state machine, persistence, and
//! the orchestrator that drives submissions through the pipeline.

pub mod store;
pub mod worker;

pub use store::{InMemoryJobStore, JobStore, StoreError};
pub use worker::Orchestrator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::ErrorKind;

/// Opaque job identifier handed back at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state machine: queued -> running -> succeeded | failed.
///
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A single processing job and its observable state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source: String,
    pub status: JobStatus,

    /// Coarse checkpoints: 0 accepted, 50 media ready, 100 document written
    pub progress: u8,

    /// Path of the finished document, set on success
    pub result: Option<PathBuf>,

    /// Human-readable cause, set on failure
    pub error: Option<String>,

    /// Taxonomy discriminant of the failure, set alongside `error`
    pub error_kind: Option<ErrorKind>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source: source.into(),
            status: JobStatus::Queued,
            progress: 0,
            result: None,
            error: None,
            error_kind: None,
            created_at: now,
            updated_at: now,
        }
    }
}
