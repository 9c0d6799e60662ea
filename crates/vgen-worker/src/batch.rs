//! Batch coordination: fan a validated submission out into jobs, run them
//! with bounded concurrency, and aggregate the report.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use vgen_models::{BatchId, BatchRequest, BatchReport, Job, JobOutcome, StatusRecord, ValidationError};
use vgen_provider::VideoGenerator;
use vgen_status::StatusStore;
use vgen_storage::{DriveClient, MediaTransfer};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{run_job, write_status};
use crate::notify::Notifier;

/// Shared dependencies for batch processing.
///
/// Trait objects at every external seam so tests can run a whole batch
/// against in-process fakes.
pub struct ProcessingContext {
    pub provider: Arc<dyn VideoGenerator>,
    pub transfer: Arc<dyn MediaTransfer>,
    pub status: Arc<dyn StatusStore>,
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Optional Drive mirror, best-effort only
    pub mirror: Option<Arc<DriveClient>>,
    pub config: WorkerConfig,
}

/// Process one batch submission to completion.
///
/// Every member job reaches a terminal status record before this
/// returns; job failures are isolated and never abort the batch. At most
/// one notification is sent, and only when the submitter asked for one.
pub async fn process_batch(
    ctx: Arc<ProcessingContext>,
    request: &BatchRequest,
) -> WorkerResult<BatchReport> {
    // Only an empty batch is a submission-level failure. A bad entry is
    // that one job's failure, handled per job below.
    if request.images.is_empty() {
        return Err(WorkerError::batch_failed(
            ValidationError::EmptyBatch.to_string(),
        ));
    }

    // A fresh batch ID per invocation: a redelivered submission is new
    // work, never a resumption of the old batch.
    let batch_id = BatchId::new();
    let total = request.images.len();
    info!(batch_id = %batch_id, jobs = total, "Starting batch");

    let jobs: Vec<Job> = request
        .images
        .iter()
        .enumerate()
        .map(|(index, source)| Job::new(&batch_id, index, source.clone(), request.params.clone()))
        .collect();

    for job in &jobs {
        write_status(&ctx, job, StatusRecord::queued()).await;
    }

    let semaphore = Arc::new(Semaphore::new(ctx.config.job_parallelism.max(1)));
    let mut outcomes: Vec<Option<JobOutcome>> = (0..total).map(|_| None).collect();
    let mut handles = Vec::new();

    for job in jobs {
        let index = job.index;

        // A bad URL fails that job alone; the rest of the batch runs.
        if let Err(e) = job.source.check_url(index) {
            let error = e.to_string();
            warn!(job_id = %job.id, "Skipping job: {}", error);
            write_status(&ctx, &job, StatusRecord::failed(&error)).await;
            outcomes[index] = Some(JobOutcome::failed(job.id.clone(), job.filename(), error));
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let job_id = job.id.clone();
        let filename = job.filename();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return JobOutcome::failed(
                        job.id.clone(),
                        job.filename(),
                        "worker shutting down".to_string(),
                    )
                }
            };
            run_job(&ctx, &job).await
        });

        handles.push((index, job_id, filename, handle));
    }

    for (index, job_id, filename, handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes[index] = Some(outcome),
            Err(e) => {
                // A panicked job task is that job's failure, not ours.
                let error = format!("job task aborted: {}", e);
                warn!(job_id = %job_id, "{}", error);
                if let Err(store_err) = ctx
                    .status
                    .upsert(&job_id, &StatusRecord::failed(&error))
                    .await
                {
                    warn!(job_id = %job_id, "Failed to record job status: {}", store_err);
                }
                outcomes[index] = Some(JobOutcome::failed(job_id, filename, error));
            }
        }
    }

    let report = BatchReport::new(batch_id, outcomes.into_iter().flatten().collect());
    info!(
        batch_id = %report.batch_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Batch finished"
    );

    if let (Some(email), Some(notifier)) = (&request.email, &ctx.notifier) {
        let subject = format!(
            "Video batch {}: {} of {} videos ready",
            report.batch_id,
            report.succeeded(),
            report.outcomes.len()
        );
        if let Err(e) = notifier.send(email, &subject, &report.summary_text()).await {
            warn!(batch_id = %report.batch_id, "Failed to send batch notification: {}", e);
        }
    }

    Ok(report)
}
