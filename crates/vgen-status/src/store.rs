//! The status store trait.

use async_trait::async_trait;

use vgen_models::{JobId, StatusRecord};

use crate::error::StatusResult;

/// Process-external key-value record of job status.
///
/// Implementations persist one snapshot per job ID with last-writer-wins
/// semantics; an update overwrites the prior record and no history is
/// retained. Upserts are atomic per key, so callers need no cross-job
/// locking.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Write (or overwrite) the snapshot for `job_id`.
    async fn upsert(&self, job_id: &JobId, record: &StatusRecord) -> StatusResult<()>;

    /// Read the current snapshot for `job_id`, if one exists.
    async fn read(&self, job_id: &JobId) -> StatusResult<Option<StatusRecord>>;
}
