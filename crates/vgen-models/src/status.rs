//! Persisted job status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::job::JobStatus;

/// A persisted snapshot of one job's status.
///
/// The store keeps exactly one record per job ID, last-writer-wins; each
/// update overwrites the prior snapshot and no history is retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current job status
    pub status: JobStatus,
    /// Phase-specific payload (message, progress, result URL or error)
    pub data: Value,
    /// Set on every status mutation
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    /// Create a record with an arbitrary payload.
    pub fn new(status: JobStatus, data: Value) -> Self {
        Self {
            status,
            data,
            updated_at: Utc::now(),
        }
    }

    /// Job is queued, waiting for a worker.
    pub fn queued() -> Self {
        Self::new(JobStatus::Queued, json!({"progress": 0.0}))
    }

    /// Job is in the processing phase with the given progress percentage.
    pub fn processing(message: impl Into<String>, progress: f64) -> Self {
        Self::new(
            JobStatus::Processing,
            json!({"message": message.into(), "progress": progress}),
        )
    }

    /// Job finished; `video_url` is the durable storage URL.
    pub fn completed(video_url: impl Into<String>) -> Self {
        Self::new(
            JobStatus::Completed,
            json!({
                "message": "Video generated and uploaded successfully",
                "video_url": video_url.into(),
                "progress": 100.0,
            }),
        )
    }

    /// Job failed with diagnostic text.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::new(JobStatus::Failed, json!({"error": error.into()}))
    }

    /// Progress percentage carried in `data`, if any.
    pub fn progress(&self) -> Option<f64> {
        self.data.get("progress").and_then(Value::as_f64)
    }

    /// Error text carried in `data`, if any.
    pub fn error_text(&self) -> Option<&str> {
        self.data.get("error").and_then(Value::as_str)
    }

    /// Result URL carried in `data`, if any.
    pub fn video_url(&self) -> Option<&str> {
        self.data.get("video_url").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_expected_payloads() {
        let r = StatusRecord::processing("Uploading", 50.0);
        assert_eq!(r.status, JobStatus::Processing);
        assert_eq!(r.progress(), Some(50.0));

        let r = StatusRecord::completed("https://bucket.nyc3.digitaloceanspaces.com/videos/a.mp4");
        assert_eq!(r.status, JobStatus::Completed);
        assert!(r.video_url().unwrap().ends_with("a.mp4"));
        assert_eq!(r.progress(), Some(100.0));

        let r = StatusRecord::failed("No output received from provider");
        assert_eq!(r.status, JobStatus::Failed);
        assert_eq!(r.error_text(), Some("No output received from provider"));
    }

    #[test]
    fn serde_roundtrip_preserves_snapshot() {
        let record = StatusRecord::processing("Starting video generation", 0.0);
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: StatusRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
