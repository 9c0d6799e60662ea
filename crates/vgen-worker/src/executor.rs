//! Batch executor.
//!
//! Pulls batch submissions off the dispatch stream and runs them one at a
//! time, with crash recovery via pending-message claims and a dead letter
//! stream for submissions that keep failing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vgen_queue::{DispatchQueue, ProcessBatchJob};

use crate::batch::{process_batch, ProcessingContext};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Executor that processes batch submissions from the queue.
pub struct BatchExecutor {
    config: WorkerConfig,
    queue: Arc<DispatchQueue>,
    ctx: Arc<ProcessingContext>,
    batch_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl BatchExecutor {
    /// Create a new batch executor.
    pub fn new(config: WorkerConfig, queue: DispatchQueue, ctx: ProcessingContext) -> Self {
        // One batch at a time: in-batch parallelism is the concurrency
        // knob, not batch-level fan-out.
        let batch_semaphore = Arc::new(Semaphore::new(1));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            batch_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!("Starting batch executor '{}'", self.consumer_name);

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically reclaim batches left pending by crashed workers.
        let queue_clone = Arc::clone(&self.queue);
        let consumer_name = self.consumer_name.clone();
        let ctx_clone = Arc::clone(&self.ctx);
        let semaphore_clone = Arc::clone(&self.batch_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle_ms, 1).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Claimed {} pending batches", jobs.len());
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let permit = match semaphore_clone.clone().acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => break,
                                    };

                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_batch(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to claim pending batches: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batches() => {
                    if let Err(e) = result {
                        error!("Error consuming batches: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for the in-flight batch to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_batches()).await;

        info!("Batch executor stopped");
        Ok(())
    }

    /// Consume and process submissions from the queue.
    async fn consume_batches(&self) -> WorkerResult<()> {
        if self.batch_semaphore.available_permits() == 0 {
            // Busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, 1)
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} submissions from queue", jobs.len());

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .batch_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::batch_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_batch(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single submission with retry and DLQ handling.
    async fn execute_batch(
        ctx: Arc<ProcessingContext>,
        queue: Arc<DispatchQueue>,
        message_id: String,
        job: ProcessBatchJob,
    ) {
        let task_id = job.task_id.clone();
        info!("Executing batch task {}", task_id);

        match process_batch(ctx, &job.request).await {
            Ok(report) => {
                info!(
                    "Batch task {} completed as batch {} ({} succeeded, {} failed)",
                    task_id,
                    report.batch_id,
                    report.succeeded(),
                    report.failed()
                );
                if let Err(e) = queue.ack(&message_id).await {
                    error!("Failed to ack batch task {}: {}", task_id, e);
                }
            }
            Err(e) => {
                error!("Batch task {} failed: {}", task_id, e);

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(999);
                let max_retries = queue.max_retries();

                if retry_count >= max_retries {
                    warn!(
                        "Batch task {} exceeded max retries ({}), moving to DLQ",
                        task_id, max_retries
                    );
                    if let Err(dlq_err) = queue.dlq(&message_id, &job, &e.to_string()).await {
                        error!("Failed to move batch task {} to DLQ: {}", task_id, dlq_err);
                    }
                } else {
                    info!(
                        "Batch task {} will be retried (attempt {}/{})",
                        task_id, retry_count, max_retries
                    );
                    // Redelivered after the visibility timeout
                }
            }
        }
    }

    /// Wait for the in-flight batch to complete.
    async fn wait_for_batches(&self) {
        loop {
            if self.batch_semaphore.available_permits() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
