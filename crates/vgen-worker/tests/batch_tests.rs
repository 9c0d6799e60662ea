//! Batch coordination tests against in-process fakes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use vgen_models::{BatchRequest, GenerationParams, ImageSource, JobStatus};
use vgen_provider::{GenerationRequest, ProviderError, ProviderResult, VideoGenerator};
use vgen_status::{MemoryStatusStore, StatusStore};
use vgen_storage::{MediaTransfer, StorageError, TransferError, TransferSource};
use vgen_worker::notify::NotifyError;
use vgen_worker::{process_batch, Notifier, ProcessingContext, WorkerConfig};

/// Provider fake: fails for any start image whose URL contains "bad",
/// returns no output for URLs containing "empty".
struct FakeGenerator;

#[async_trait]
impl VideoGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<String> {
        if request.start_image.contains("bad") {
            return Err(ProviderError::prediction_failed("model rejected the image"));
        }
        if request.start_image.contains("empty") {
            return Err(ProviderError::NoOutput);
        }
        Ok(format!("https://provider.example.com/out/{}.mp4", request.prompt.len()))
    }
}

/// Transfer fake counting invocations; fails when constructed with `fail`.
struct FakeTransfer {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeTransfer {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
        }
    }
}

#[async_trait]
impl MediaTransfer for FakeTransfer {
    async fn transfer(
        &self,
        _source: &TransferSource,
        key: &str,
        _content_type: &str,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<String, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransferError {
                attempts: 3,
                cause: StorageError::upload_failed("stream reset"),
            });
        }
        on_progress(0.25);
        on_progress(0.6);
        on_progress(1.0);
        Ok(format!("https://bucket.region.digitaloceanspaces.com/{}", key))
    }
}

/// Captures notifications instead of sending them.
#[derive(Default)]
struct CapturingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

struct Harness {
    ctx: Arc<ProcessingContext>,
    status: MemoryStatusStore,
    transfer: Arc<FakeTransfer>,
    notifier: Arc<CapturingNotifier>,
}

fn harness(transfer_fails: bool) -> Harness {
    let status = MemoryStatusStore::new();
    let transfer = Arc::new(FakeTransfer::new(transfer_fails));
    let notifier = Arc::new(CapturingNotifier::default());

    let ctx = Arc::new(ProcessingContext {
        provider: Arc::new(FakeGenerator),
        transfer: Arc::clone(&transfer) as Arc<dyn MediaTransfer>,
        status: Arc::new(status.clone()),
        notifier: Some(Arc::clone(&notifier) as Arc<dyn Notifier>),
        mirror: None,
        config: WorkerConfig::default(),
    });

    Harness {
        ctx,
        status,
        transfer,
        notifier,
    }
}

fn request_with(images: serde_json::Value, email: Option<&str>) -> BatchRequest {
    let mut payload = json!({
        "images": images,
        "prompt": "gentle camera push",
    });
    if let Some(email) = email {
        payload["email"] = json!(email);
    }
    BatchRequest::from_payload(&payload).expect("payload should validate")
}

#[tokio::test]
async fn every_job_reaches_a_terminal_record() {
    let h = harness(false);
    let request = request_with(
        json!([
            {"url": "https://img.example.com/a.jpg", "name": "sunrise"},
            {"url": "https://img.example.com/b.jpg", "name": "noon"},
            {"url": "https://img.example.com/c.jpg", "name": "sunset"},
        ]),
        None,
    );

    let report = process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 3);

    for outcome in &report.outcomes {
        let record = h
            .status
            .read(&outcome.job_id)
            .await
            .unwrap()
            .expect("record should exist");
        assert!(record.status.is_terminal());
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.video_url().unwrap().contains(".mp4"));
    }
}

#[tokio::test]
async fn provider_failure_is_isolated_to_its_job() {
    let h = harness(false);
    let request = request_with(
        json!([
            {"url": "https://img.example.com/a.jpg", "name": "one"},
            {"url": "https://img.example.com/bad.jpg", "name": "two"},
            {"url": "https://img.example.com/c.jpg", "name": "three"},
        ]),
        None,
    );

    let report = process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    let statuses: Vec<JobStatus> = {
        let mut v = Vec::new();
        for outcome in &report.outcomes {
            v.push(h.status.read(&outcome.job_id).await.unwrap().unwrap().status);
        }
        v
    };
    assert_eq!(
        statuses,
        vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Completed]
    );

    let failed = &report.outcomes[1];
    let record = h.status.read(&failed.job_id).await.unwrap().unwrap();
    assert!(record.error_text().unwrap().contains("model rejected"));
}

#[tokio::test]
async fn no_provider_output_skips_the_transfer() {
    let h = harness(false);
    let request = request_with(
        json!([{"url": "https://img.example.com/empty.jpg", "name": "void"}]),
        None,
    );

    let report = process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(h.transfer.calls.load(Ordering::SeqCst), 0);

    let record = h.status.read(&report.outcomes[0].job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
}

#[tokio::test]
async fn exhausted_transfer_failure_lands_in_the_status_record() {
    let h = harness(true);
    let request = request_with(
        json!([{"url": "https://img.example.com/a.jpg", "name": "clip"}]),
        None,
    );

    let report = process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    assert_eq!(report.failed(), 1);
    let record = h.status.read(&report.outcomes[0].job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_text().unwrap().contains("stream reset"));
}

/// Build a request directly, bypassing intake validation. The queue only
/// guarantees at-least-once delivery of whatever bytes were enqueued, so
/// the coordinator can see entries intake would have rejected.
fn raw_request(images: Vec<ImageSource>) -> BatchRequest {
    BatchRequest {
        images,
        params: GenerationParams::default(),
        email: None,
    }
}

#[tokio::test]
async fn unparseable_url_fails_that_job_only() {
    let h = harness(false);
    let request = raw_request(vec![
        ImageSource {
            name: "fine".to_string(),
            url: "https://img.example.com/a.jpg".to_string(),
        },
        ImageSource {
            name: "wrong-scheme".to_string(),
            url: "ftp://img.example.com/b.jpg".to_string(),
        },
    ]);

    let report = process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);

    let good = h.status.read(&report.outcomes[0].job_id).await.unwrap().unwrap();
    assert_eq!(good.status, JobStatus::Completed);

    let record = h.status.read(&report.outcomes[1].job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_text().unwrap().contains("scheme"));
}

#[tokio::test]
async fn unresolvable_entry_never_aborts_the_batch() {
    let h = harness(false);
    let request = raw_request(vec![
        ImageSource {
            name: "fine".to_string(),
            url: "https://img.example.com/a.jpg".to_string(),
        },
        ImageSource {
            name: "mangled".to_string(),
            url: "not a url".to_string(),
        },
    ]);

    let report = process_batch(Arc::clone(&h.ctx), &request)
        .await
        .expect("a bad entry is that job's failure, not the batch's");

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        h.status.read(&report.outcomes[1].job_id).await.unwrap().unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn empty_batch_is_a_submission_failure() {
    let h = harness(false);
    let result = process_batch(Arc::clone(&h.ctx), &raw_request(vec![])).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn notification_sent_once_with_one_line_per_job() {
    let h = harness(false);
    let request = request_with(
        json!([
            {"url": "https://img.example.com/a.jpg", "name": "alpha"},
            {"url": "https://img.example.com/bad.jpg", "name": "beta"},
        ]),
        Some("user@example.com"),
    );

    let report = process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    let sent = h.notifier.sent.lock().await;
    assert_eq!(sent.len(), 1);

    let (recipient, subject, body) = &sent[0];
    assert_eq!(recipient, "user@example.com");
    assert!(subject.contains(&report.batch_id.to_string()));

    // One line per job after the header and blank line
    let job_lines: Vec<&str> = body.lines().skip(2).collect();
    assert_eq!(job_lines.len(), 2);
    assert!(job_lines[0].contains("alpha"));
    assert!(job_lines[1].contains("FAILED"));
}

#[tokio::test]
async fn no_email_means_no_notification() {
    let h = harness(false);
    let request = request_with(
        json!([{"url": "https://img.example.com/a.jpg", "name": "solo"}]),
        None,
    );

    process_batch(Arc::clone(&h.ctx), &request).await.unwrap();

    assert!(h.notifier.sent.lock().await.is_empty());
}
