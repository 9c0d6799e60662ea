//! Job types carried on the dispatch stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vgen_models::BatchRequest;

/// A batch submission waiting to be processed.
///
/// Each submission is independent work; re-submitting the same images
/// is a new batch with a new task ID, not a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessBatchJob {
    /// Unique dispatch task ID
    pub task_id: String,
    /// Validated batch request
    pub request: BatchRequest,
    /// When the submission was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessBatchJob {
    /// Wrap a validated request for dispatch.
    pub fn new(request: BatchRequest) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            request,
            enqueued_at: Utc::now(),
        }
    }
}
