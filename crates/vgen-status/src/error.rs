//! Status store error types.

use thiserror::Error;

pub type StatusResult<T> = Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Upsert failed: {0}")]
    UpsertFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatusError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn upsert_failed(msg: impl Into<String>) -> Self {
        Self::UpsertFailed(msg.into())
    }
}
