//! In-memory status store for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use vgen_models::{JobId, StatusRecord};

use crate::error::StatusResult;
use crate::store::StatusStore;

/// In-memory status store with the same last-writer-wins semantics as
/// the Redis-backed implementation.
#[derive(Default, Clone)]
pub struct MemoryStatusStore {
    records: Arc<RwLock<HashMap<String, StatusRecord>>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, keyed by job ID.
    pub async fn all(&self) -> HashMap<String, StatusRecord> {
        self.records.read().await.clone()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn upsert(&self, job_id: &JobId, record: &StatusRecord) -> StatusResult<()> {
        self.records
            .write()
            .await
            .insert(job_id.to_string(), record.clone());
        Ok(())
    }

    async fn read(&self, job_id: &JobId) -> StatusResult<Option<StatusRecord>> {
        Ok(self.records.read().await.get(job_id.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgen_models::JobStatus;

    #[tokio::test]
    async fn upsert_then_read_roundtrips() {
        let store = MemoryStatusStore::new();
        let job_id = JobId::from_string("b1_0");
        let record = StatusRecord::processing("Starting video generation", 0.0);

        store.upsert(&job_id, &record).await.unwrap();
        let read = store.read(&job_id).await.unwrap().unwrap();
        assert_eq!(read, record);
    }

    #[tokio::test]
    async fn read_absent_returns_none() {
        let store = MemoryStatusStore::new();
        assert!(store
            .read(&JobId::from_string("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let store = MemoryStatusStore::new();
        let job_id = JobId::from_string("b1_0");

        store
            .upsert(&job_id, &StatusRecord::processing("generating", 0.0))
            .await
            .unwrap();
        store
            .upsert(&job_id, &StatusRecord::completed("https://s/x.mp4"))
            .await
            .unwrap();

        let read = store.read(&job_id).await.unwrap().unwrap();
        assert_eq!(read.status, JobStatus::Completed);
        // The whole snapshot was replaced, not merged.
        assert!(read.data.get("message").is_some());
        assert_eq!(read.video_url(), Some("https://s/x.mp4"));
        assert_eq!(store.len().await, 1);
    }
}
