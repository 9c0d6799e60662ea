//! Per-job pipeline: generate a video from one image, move it to durable
//! storage, and record every status transition.
//!
//! A job never touches its siblings; any failure here becomes that job's
//! terminal `failed` record and nothing else.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use vgen_models::{Job, JobOutcome, StatusRecord};
use vgen_provider::GenerationRequest;
use vgen_storage::TransferSource;

use crate::batch::ProcessingContext;
use crate::logging::JobLogger;

/// Record a status transition, logging (not propagating) store failures.
///
/// Status persistence is observability, not control flow; a flaky store
/// must not fail a job whose video generated fine.
pub(crate) async fn write_status(ctx: &ProcessingContext, job: &Job, record: StatusRecord) {
    if let Err(e) = ctx.status.upsert(&job.id, &record).await {
        warn!(job_id = %job.id, "Failed to record job status: {}", e);
    }
}

async fn fail(ctx: &ProcessingContext, job: &Job, error: String) -> JobOutcome {
    JobLogger::new(&job.id, "pipeline").log_error(&error);
    write_status(ctx, job, StatusRecord::failed(&error)).await;
    JobOutcome::failed(job.id.clone(), job.filename(), error)
}

/// Run one job to its terminal status and return the outcome.
///
/// Phases: provider call (dominant latency, not retried here), then the
/// resumable transfer into durable storage with its progress mirrored
/// into the 50-100 band of the job's status record.
pub async fn run_job(ctx: &ProcessingContext, job: &Job) -> JobOutcome {
    let log = JobLogger::new(&job.id, "generation");
    log.log_start(&format!("image '{}'", job.source.url));

    write_status(ctx, job, StatusRecord::processing("Starting video generation", 0.0)).await;

    let request = GenerationRequest::new(job.source.url.clone(), &job.params);
    let generated_url = match tokio::time::timeout(
        ctx.config.provider_timeout,
        ctx.provider.generate(&request),
    )
    .await
    {
        Ok(Ok(url)) => url,
        Ok(Err(e)) => return fail(ctx, job, format!("Video generation failed: {}", e)).await,
        Err(_) => {
            return fail(
                ctx,
                job,
                format!(
                    "Video generation timed out after {}s",
                    ctx.config.provider_timeout.as_secs()
                ),
            )
            .await
        }
    };

    log.log_progress("Generation complete, uploading to storage");
    write_status(ctx, job, StatusRecord::processing("Uploading video", 50.0)).await;

    // Transfer progress is mirrored into the status store through a
    // channel so the engine never awaits a status write mid-stream.
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f64>();
    let status = Arc::clone(&ctx.status);
    let writer_job_id = job.id.clone();
    let writer = tokio::spawn(async move {
        while let Some(fraction) = progress_rx.recv().await {
            let overall = 50.0 + fraction * 50.0;
            let record = StatusRecord::processing("Uploading video", overall);
            if let Err(e) = status.upsert(&writer_job_id, &record).await {
                warn!(job_id = %writer_job_id, "Failed to record upload progress: {}", e);
            }
        }
    });

    let source = TransferSource::RemoteUrl(generated_url);
    let key = job.storage_key();
    let mut on_progress = move |fraction: f64| {
        progress_tx.send(fraction).ok();
    };

    let transferred = ctx
        .transfer
        .transfer(&source, &key, "video/mp4", &mut on_progress)
        .await;
    // Close the channel so the writer drains and exits.
    drop(on_progress);
    writer.await.ok();

    let storage_url = match transferred {
        Ok(url) => url,
        Err(e) => return fail(ctx, job, format!("Video upload failed: {}", e)).await,
    };

    // Best-effort mirror; the durable copy already exists.
    if let Some(drive) = &ctx.mirror {
        let mirror_name = format!("{}_{}.mp4", job.filename(), job.id);
        if let Err(e) = drive
            .upload_from_url(&storage_url, &mirror_name, "video/mp4", |_| {})
            .await
        {
            warn!(job_id = %job.id, "Drive mirror failed: {}", e);
        }
    }

    log.log_completion(&storage_url);
    write_status(ctx, job, StatusRecord::completed(&storage_url)).await;
    JobOutcome::succeeded(job.id.clone(), job.filename(), storage_url)
}
