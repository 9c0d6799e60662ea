//! Batch and job identity, job status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::GenerationParams;
use crate::request::ImageSource;

/// Unique identifier for a batch.
///
/// Generated at batch start, never supplied by the caller, so concurrent
/// submissions cannot collide and a redelivered queue task produces a
/// fresh batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

impl BatchId {
    /// Generate a new random batch ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a job.
///
/// Derived from the batch ID plus the job's ordinal index, so the same
/// batch always yields the same job IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Derive the job ID for the `index`-th member of a batch.
    pub fn derive(batch_id: &BatchId, index: usize) -> Self {
        Self(format!("{}_{}", batch_id, index))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
///
/// Transitions are strictly forward: `queued -> processing -> {completed | failed}`.
/// `processing` is entered exactly once and spans both the provider call and
/// the transfer phase; the progress value distinguishes the sub-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker
    #[default]
    Queued,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check whether a transition to `next` moves forward through the
    /// state machine. Terminal states accept no transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Processing) => true,
            (JobStatus::Queued, JobStatus::Completed | JobStatus::Failed) => true,
            (JobStatus::Processing, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed | JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work: convert a single image into one output video.
///
/// Owned exclusively by the job executor that processes it. Parameters are
/// immutable once the job starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID (`{batch_id}_{index}`)
    pub id: JobId,
    /// Batch this job belongs to
    pub batch_id: BatchId,
    /// Ordinal index within the batch
    pub index: usize,
    /// Normalized source image reference
    pub source: ImageSource,
    /// Generation parameters shared across the batch
    pub params: GenerationParams,
}

impl Job {
    /// Build the `index`-th job of a batch.
    pub fn new(batch_id: &BatchId, index: usize, source: ImageSource, params: GenerationParams) -> Self {
        Self {
            id: JobId::derive(batch_id, index),
            batch_id: batch_id.clone(),
            index,
            source,
            params,
        }
    }

    /// Human-readable output filename stem for this job.
    ///
    /// Falls back to `video_{index}` when the source has no usable name.
    pub fn filename(&self) -> String {
        let stem = sanitize_filename(&self.source.name);
        if stem.is_empty() {
            format!("video_{}", self.index)
        } else {
            stem
        }
    }

    /// Deterministic storage key for this job's output.
    pub fn storage_key(&self) -> String {
        format!("videos/{}_{}.mp4", self.filename(), self.id)
    }
}

/// Strip path separators and whitespace so user-supplied names cannot
/// escape the destination prefix.
fn sanitize_filename(name: &str) -> String {
    name.trim()
        .trim_end_matches(".mp4")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
