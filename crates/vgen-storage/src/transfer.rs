//! The transfer engine: chunked, resumable, retrying uploads.
//!
//! Moves bytes from a local buffer or a remote URL stream into Spaces
//! without buffering whole payloads in memory. Large payloads go through
//! the multipart API so a transient mid-transfer failure resumes from the
//! last acknowledged part; payloads that fit in a single part fall back
//! to retrying the whole upload. Progress is reported through a caller
//! supplied callback at chunk boundaries, strictly increasing.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::SpacesClient;
use crate::error::{StorageError, StorageResult};
use crate::progress::ProgressTracker;

/// Read granularity and progress-callback granularity.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Multipart parts must be at least 5 MiB, except the last.
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// A transfer that exhausted its retry budget.
///
/// Carries the last underlying cause; the job executor treats this as the
/// job's terminal failure.
#[derive(Debug, Error)]
#[error("Transfer failed after {attempts} attempts: {cause}")]
pub struct TransferError {
    /// Attempts consumed, including the initial one
    pub attempts: u32,
    /// Last underlying cause
    #[source]
    pub cause: StorageError,
}

/// Source of a transfer.
#[derive(Debug, Clone)]
pub enum TransferSource {
    /// A finite byte buffer of known length.
    Bytes(Vec<u8>),
    /// A remote URL streamed through without buffering the whole payload.
    RemoteUrl(String),
}

/// Seam for the job executor; lets tests substitute an in-process fake.
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Move `source` to `key` at the destination, reporting progress
    /// fractions in [0, 1]. Returns the public URL of the uploaded object.
    async fn transfer(
        &self,
        source: &TransferSource,
        key: &str,
        content_type: &str,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<String, TransferError>;
}

/// Resumable-upload state carried across retry attempts.
///
/// Lives only for the duration of one `transfer` call: a resume covers a
/// dropped connection, not a worker-process restart.
#[derive(Debug, Default)]
struct MultipartState {
    upload_id: Option<String>,
    parts: Vec<(i32, String)>,
    bytes_acked: u64,
}

/// Chunked, resumable, retrying transfer into Spaces.
pub struct TransferEngine {
    spaces: SpacesClient,
    http: reqwest::Client,
    chunk_size: usize,
    max_attempts: u32,
    base_delay: Duration,
}

impl TransferEngine {
    /// Create an engine over an already-constructed Spaces client.
    pub fn new(spaces: SpacesClient) -> Self {
        Self {
            spaces,
            http: reqwest::Client::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Override the retry budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the base retry delay (the n-th retry waits n × base).
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Override the chunk size used for reads and progress granularity.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Flush one part, recording its ETag and acknowledged bytes.
    ///
    /// Callers cut parts at exactly `MIN_PART_SIZE` (final part excepted)
    /// so `bytes_acked` stays part-aligned and resume offsets are
    /// deterministic.
    async fn flush_part(
        &self,
        key: &str,
        content_type: &str,
        state: &mut MultipartState,
        data: Vec<u8>,
    ) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let upload_id = match &state.upload_id {
            Some(id) => id.clone(),
            None => {
                let id = self.spaces.create_multipart(key, content_type).await?;
                state.upload_id = Some(id.clone());
                id
            }
        };

        let part_number = state.parts.len() as i32 + 1;
        let len = data.len() as u64;
        let etag = self
            .spaces
            .upload_part(key, &upload_id, part_number, data)
            .await?;

        state.parts.push((part_number, etag));
        state.bytes_acked += len;
        Ok(())
    }

    /// One attempt at streaming a remote URL into the destination,
    /// resuming from `state.bytes_acked` when the source supports byte
    /// ranges.
    async fn stream_url_attempt(
        &self,
        url: &str,
        key: &str,
        content_type: &str,
        state: &mut MultipartState,
        tracker: &mut ProgressTracker,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> StorageResult<String> {
        let mut request = self.http.get(url);
        let resuming = state.bytes_acked > 0;
        if resuming {
            request = request.header(RANGE, format!("bytes={}-", state.bytes_acked));
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::source_read(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::source_read(e.to_string()))?;

        if resuming && response.status() != StatusCode::PARTIAL_CONTENT {
            // Source ignored the range request; the bytes already uploaded
            // no longer line up, so restart the upload from zero.
            debug!(key, "Source does not support ranges, restarting upload");
            if let Some(upload_id) = state.upload_id.take() {
                self.spaces.abort_multipart(key, &upload_id).await.ok();
            }
            *state = MultipartState::default();
        }

        let total = response
            .content_length()
            .map(|remaining| state.bytes_acked + remaining);
        tracker.resume(state.bytes_acked, total);

        let mut stream = response.bytes_stream();
        let mut part_buf: Vec<u8> = Vec::with_capacity(MIN_PART_SIZE);

        while let Some(piece) = stream.next().await {
            let piece = piece.map_err(|e| StorageError::source_read(e.to_string()))?;
            part_buf.extend_from_slice(&piece);

            if let Some(fraction) = tracker.advance(piece.len() as u64) {
                on_progress(fraction);
            }

            while part_buf.len() >= MIN_PART_SIZE {
                let part: Vec<u8> = part_buf.drain(..MIN_PART_SIZE).collect();
                self.flush_part(key, content_type, state, part).await?;
            }
        }

        match state.upload_id.clone() {
            // Whole payload fit below the multipart threshold: single put.
            None => {
                self.spaces
                    .put_object(key, std::mem::take(&mut part_buf), content_type)
                    .await?;
            }
            Some(upload_id) => {
                self.flush_part(key, content_type, state, std::mem::take(&mut part_buf))
                    .await?;
                self.spaces
                    .complete_multipart(key, &upload_id, &state.parts)
                    .await?;
            }
        }

        if let Some(fraction) = tracker.finish() {
            on_progress(fraction);
        }
        Ok(self.spaces.public_url(key))
    }

    /// One attempt at uploading an in-memory buffer, resuming from the
    /// last acknowledged part for large payloads.
    async fn bytes_attempt(
        &self,
        data: &[u8],
        key: &str,
        content_type: &str,
        state: &mut MultipartState,
        tracker: &mut ProgressTracker,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> StorageResult<String> {
        tracker.resume(state.bytes_acked, Some(data.len() as u64));

        if data.len() <= MIN_PART_SIZE {
            // Below the multipart threshold: whole-transfer retry.
            self.spaces
                .put_object(key, data.to_vec(), content_type)
                .await?;
        } else {
            for part in data[state.bytes_acked as usize..].chunks(MIN_PART_SIZE) {
                self.flush_part(key, content_type, state, part.to_vec())
                    .await?;
                if let Some(fraction) = tracker.advance(part.len() as u64) {
                    on_progress(fraction);
                }
            }
            let upload_id = state.upload_id.clone().unwrap_or_default();
            self.spaces
                .complete_multipart(key, &upload_id, &state.parts)
                .await?;
        }

        if let Some(fraction) = tracker.finish() {
            on_progress(fraction);
        }
        Ok(self.spaces.public_url(key))
    }

    async fn attempt(
        &self,
        source: &TransferSource,
        key: &str,
        content_type: &str,
        state: &mut MultipartState,
        tracker: &mut ProgressTracker,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> StorageResult<String> {
        match source {
            TransferSource::RemoteUrl(url) => {
                self.stream_url_attempt(url, key, content_type, state, tracker, on_progress)
                    .await
            }
            TransferSource::Bytes(data) => {
                self.bytes_attempt(data, key, content_type, state, tracker, on_progress)
                    .await
            }
        }
    }
}

#[async_trait]
impl MediaTransfer for TransferEngine {
    async fn transfer(
        &self,
        source: &TransferSource,
        key: &str,
        content_type: &str,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<String, TransferError> {
        let mut state = MultipartState::default();
        let mut tracker = ProgressTracker::new(None, self.chunk_size as u64);
        let mut attempt = 1u32;

        loop {
            let result = self
                .attempt(source, key, content_type, &mut state, &mut tracker, on_progress)
                .await;
            match result {
                Ok(url) => return Ok(url),
                Err(cause) if attempt < self.max_attempts => {
                    let delay = self.base_delay * attempt;
                    warn!(
                        key,
                        attempt,
                        "Transfer attempt failed, retrying in {:?}: {}",
                        delay,
                        cause
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(cause) => {
                    // Best-effort cleanup of the abandoned multipart upload.
                    if let Some(upload_id) = state.upload_id.take() {
                        if let Err(e) = self.spaces.abort_multipart(key, &upload_id).await {
                            warn!(key, "Failed to abort multipart upload: {}", e);
                        }
                    }
                    return Err(TransferError {
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }
}
