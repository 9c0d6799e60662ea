//! Google Drive resumable-upload client, used as an optional mirror
//! destination for generated videos.
//!
//! Implements the Drive v3 resumable session protocol: start a session,
//! PUT fixed-size chunks with `Content-Range`, interpret 308 responses to
//! learn the last acknowledged byte, and query the session offset after a
//! dropped connection so the transfer continues instead of restarting.

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Upload chunk size (1 MiB). Drive requires chunk sizes in multiples
/// of 256 KiB.
const CHUNK_SIZE: usize = 1024 * 1024;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_SECS: u64 = 2;

/// Configuration for the Drive mirror.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Destination folder ID
    pub folder_id: String,
    /// OAuth2 bearer token
    pub access_token: String,
    /// API base URL; overridable for tests
    pub api_base: String,
}

impl DriveConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` when `GOOGLE_DRIVE_FOLDER_ID` or
    /// `GOOGLE_DRIVE_ACCESS_TOKEN` is unset, signalling that mirroring is
    /// not configured and should be skipped.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            folder_id: std::env::var("GOOGLE_DRIVE_FOLDER_ID").ok()?,
            access_token: std::env::var("GOOGLE_DRIVE_ACCESS_TOKEN").ok()?,
            api_base: std::env::var("GOOGLE_DRIVE_API_BASE")
                .unwrap_or_else(|_| "https://www.googleapis.com".to_string()),
        })
    }
}

/// A file created in Drive.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    /// File ID
    pub id: String,
    /// Browser link to the file
    #[serde(rename = "webViewLink")]
    pub web_view_link: Option<String>,
}

/// Outcome of one chunk PUT.
enum ChunkAck {
    /// Backend acknowledged bytes up to (exclusive) this offset.
    Partial(u64),
    /// Upload finished; metadata of the created file.
    Complete(DriveFile),
}

/// Google Drive folder-backend client.
pub struct DriveClient {
    http: reqwest::Client,
    config: DriveConfig,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(config: DriveConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create from environment variables, `None` when not configured.
    pub fn from_env() -> Option<Self> {
        DriveConfig::from_env().map(Self::new)
    }

    /// Start a resumable upload session, returning the session URI.
    async fn start_session(
        &self,
        name: &str,
        total_len: u64,
        content_type: &str,
    ) -> StorageResult<String> {
        let url = format!(
            "{}/upload/drive/v3/files?uploadType=resumable&fields=id,webViewLink",
            self.config.api_base
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", total_len)
            .json(&json!({
                "name": name,
                "parents": [self.config.folder_id],
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| StorageError::session(e.to_string()))?;

        let session_uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StorageError::invalid_response("missing session Location header"))?
            .to_string();

        debug!(name, "Started Drive resumable session");
        Ok(session_uri)
    }

    /// PUT one chunk at `offset`.
    async fn put_chunk(
        &self,
        session_uri: &str,
        offset: u64,
        total_len: u64,
        data: Vec<u8>,
    ) -> StorageResult<ChunkAck> {
        let end = offset + data.len() as u64 - 1;
        let response = self
            .http
            .put(session_uri)
            .header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, end, total_len))
            .header(CONTENT_LENGTH, data.len())
            .body(data)
            .send()
            .await?;

        match response.status() {
            // 308 Resume Incomplete: the Range header carries the last
            // acknowledged byte.
            StatusCode::PERMANENT_REDIRECT => {
                let acked = parse_acked_range(&response)?;
                Ok(ChunkAck::Partial(acked))
            }
            s if s.is_success() => {
                let file: DriveFile = response.json().await.map_err(|e| {
                    StorageError::invalid_response(format!("malformed file metadata: {}", e))
                })?;
                Ok(ChunkAck::Complete(file))
            }
            s => Err(StorageError::upload_failed(format!(
                "chunk upload returned {}",
                s
            ))),
        }
    }

    /// Ask the session how many bytes it has acknowledged.
    async fn query_offset(&self, session_uri: &str, total_len: u64) -> StorageResult<u64> {
        let response = self
            .http
            .put(session_uri)
            .header(CONTENT_RANGE, format!("bytes */{}", total_len))
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;

        match response.status() {
            StatusCode::PERMANENT_REDIRECT => parse_acked_range(&response),
            s if s.is_success() => Ok(total_len),
            s => Err(StorageError::session(format!(
                "session status query returned {}",
                s
            ))),
        }
    }

    /// Upload a file to the configured folder directly from a URL,
    /// streaming in chunks and resuming across connection drops.
    pub async fn upload_from_url(
        &self,
        source_url: &str,
        name: &str,
        content_type: &str,
        mut on_progress: impl FnMut(f64) + Send,
    ) -> StorageResult<DriveFile> {
        use futures_util::StreamExt;

        let probe = self
            .http
            .get(source_url)
            .send()
            .await
            .map_err(|e| StorageError::source_read(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::source_read(e.to_string()))?;

        let total_len = probe
            .content_length()
            .ok_or_else(|| StorageError::source_read("source did not report a length"))?;

        let session_uri = self.start_session(name, total_len, content_type).await?;

        let mut offset: u64 = 0;
        let mut attempt: u32 = 0;
        let mut stream = Some(probe.bytes_stream());
        let mut buf: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);

        loop {
            // (Re)open the source at the current offset when needed.
            let mut body = match stream.take() {
                Some(s) => s,
                None => {
                    let response = self
                        .http
                        .get(source_url)
                        .header(reqwest::header::RANGE, format!("bytes={}-", offset))
                        .send()
                        .await
                        .map_err(|e| StorageError::source_read(e.to_string()))?
                        .error_for_status()
                        .map_err(|e| StorageError::source_read(e.to_string()))?;
                    if response.status() != StatusCode::PARTIAL_CONTENT {
                        return Err(StorageError::source_read(
                            "source does not support range requests; cannot resume",
                        ));
                    }
                    response.bytes_stream()
                }
            };
            buf.clear();

            let result: StorageResult<Option<DriveFile>> = async {
                while let Some(piece) = body.next().await {
                    let piece = piece.map_err(|e| StorageError::source_read(e.to_string()))?;
                    buf.extend_from_slice(&piece);

                    while buf.len() >= CHUNK_SIZE {
                        let chunk: Vec<u8> = buf.drain(..CHUNK_SIZE).collect();
                        let expected = offset + chunk.len() as u64;
                        match self.put_chunk(&session_uri, offset, total_len, chunk).await? {
                            ChunkAck::Partial(acked) => {
                                offset = acked;
                                on_progress((offset as f64 / total_len as f64).min(1.0));
                                if acked != expected {
                                    // Short ack: the buffered bytes no longer
                                    // line up with the session offset. Resync
                                    // and re-read the source from there.
                                    return Ok(None);
                                }
                            }
                            ChunkAck::Complete(file) => return Ok(Some(file)),
                        }
                    }
                }

                // Final (short) chunk.
                if !buf.is_empty() || total_len == 0 {
                    let chunk = std::mem::take(&mut buf);
                    match self.put_chunk(&session_uri, offset, total_len, chunk).await? {
                        ChunkAck::Partial(acked) => {
                            offset = acked;
                            Ok(None)
                        }
                        ChunkAck::Complete(file) => Ok(Some(file)),
                    }
                } else {
                    Ok(None)
                }
            }
            .await;

            match result {
                Ok(Some(file)) => {
                    on_progress(1.0);
                    info!(name, file_id = %file.id, "Mirrored to Drive");
                    return Ok(file);
                }
                Ok(None) => {
                    // Stream ended but the session is not complete;
                    // treat like a drop and resync below.
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(e);
                    }
                    warn!(name, attempt, "Drive chunk upload failed, resuming: {}", e);
                }
            }

            attempt += 1;
            if attempt > MAX_RETRIES {
                return Err(StorageError::session("resumable upload did not converge"));
            }
            tokio::time::sleep(std::time::Duration::from_secs(RETRY_DELAY_SECS * attempt as u64))
                .await;

            // Resync with the session before re-reading the source.
            offset = self.query_offset(&session_uri, total_len).await?;
            if offset >= total_len {
                // Everything was acknowledged; the completion response was
                // lost. Query once more to fetch nothing further; report done.
                return Err(StorageError::session(
                    "session acknowledged all bytes but returned no file metadata",
                ));
            }
        }
    }
}

/// Parse the exclusive acknowledged offset out of a 308 `Range` header
/// of the form `bytes=0-12345`.
fn parse_acked_range(response: &reqwest::Response) -> StorageResult<u64> {
    let header = match response.headers().get(reqwest::header::RANGE) {
        Some(v) => v
            .to_str()
            .map_err(|_| StorageError::invalid_response("unreadable Range header"))?,
        // No Range header on a 308 means nothing was acknowledged yet.
        None => return Ok(0),
    };

    let last = header
        .rsplit('-')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            StorageError::invalid_response(format!("malformed Range header '{}'", header))
        })?;

    Ok(last + 1)
}
