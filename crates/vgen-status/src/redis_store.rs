//! Redis-backed status store.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use vgen_models::{JobId, StatusRecord};

use crate::error::StatusResult;
use crate::store::StatusStore;

/// Status store configuration.
#[derive(Debug, Clone)]
pub struct StatusStoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for status records
    pub key_prefix: String,
    /// TTL for status records in seconds
    pub record_ttl_secs: u64,
}

impl Default for StatusStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vgen:status".to_string(),
            record_ttl_secs: 7 * 24 * 3600,
        }
    }
}

impl StatusStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STATUS_KEY_PREFIX")
                .unwrap_or_else(|_| "vgen:status".to_string()),
            record_ttl_secs: std::env::var("STATUS_RECORD_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7 * 24 * 3600),
        }
    }
}

/// Job status store backed by Redis.
///
/// Each job maps to one JSON value under `{prefix}:{job_id}`; a plain SET
/// gives the atomic single-key last-writer-wins upsert the pipeline
/// relies on. Records expire after a TTL so abandoned jobs do not
/// accumulate.
pub struct RedisStatusStore {
    client: redis::Client,
    config: StatusStoreConfig,
}

impl RedisStatusStore {
    /// Create a new store.
    pub fn new(config: StatusStoreConfig) -> StatusResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StatusResult<Self> {
        Self::new(StatusStoreConfig::from_env())
    }

    fn key(&self, job_id: &JobId) -> String {
        format!("{}:{}", self.config.key_prefix, job_id)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn upsert(&self, job_id: &JobId, record: &StatusRecord) -> StatusResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;

        conn.set_ex::<_, _, ()>(self.key(job_id), payload, self.config.record_ttl_secs)
            .await?;

        debug!(job_id = %job_id, status = %record.status, "Upserted status record");
        Ok(())
    }

    async fn read(&self, job_id: &JobId) -> StatusResult<Option<StatusRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(self.key(job_id)).await?;

        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }
}
