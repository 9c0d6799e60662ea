//! DigitalOcean Spaces client implementation.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the Spaces client.
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket (Space) name
    pub bucket: String,
    /// Region, e.g. "nyc3"
    pub region: String,
    /// Endpoint override; defaults to the regional Spaces endpoint.
    /// Used by tests to point the client at a local server.
    pub endpoint_url: Option<String>,
}

impl SpacesConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            access_key_id: std::env::var("SPACES_KEY")
                .map_err(|_| StorageError::config_error("SPACES_KEY not set"))?,
            secret_access_key: std::env::var("SPACES_SECRET")
                .map_err(|_| StorageError::config_error("SPACES_SECRET not set"))?,
            bucket: std::env::var("SPACES_BUCKET")
                .map_err(|_| StorageError::config_error("SPACES_BUCKET not set"))?,
            region: std::env::var("SPACES_REGION").unwrap_or_else(|_| "nyc3".to_string()),
            endpoint_url: std::env::var("SPACES_ENDPOINT_URL").ok(),
        })
    }

    fn endpoint(&self) -> String {
        self.endpoint_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.digitaloceanspaces.com", self.region))
    }
}

/// DigitalOcean Spaces storage client.
///
/// Constructed once with its credentials and passed by reference into the
/// transfer engine; never recreated per call.
#[derive(Clone)]
pub struct SpacesClient {
    client: Client,
    bucket: String,
    region: String,
}

impl SpacesClient {
    /// Create a new Spaces client from configuration.
    pub fn new(config: SpacesConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "spaces",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            // The transfer engine owns the retry policy; SDK-level
            // retries would hide attempts from it.
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket,
            region: config.region,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(SpacesConfig::from_env()?))
    }

    /// Public URL of an uploaded object (virtual-hosted form).
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.{}.digitaloceanspaces.com/{}",
            self.bucket, self.region, key
        )
    }

    /// Upload a whole object in one request, publicly readable and tagged
    /// with the supplied content type.
    pub async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Start a multipart upload, returning its upload ID.
    pub async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let upload_id = response
            .upload_id()
            .ok_or_else(|| StorageError::invalid_response("missing upload ID"))?
            .to_string();

        debug!("Started multipart upload {} for {}", upload_id, key);
        Ok(upload_id)
    }

    /// Upload one part; part numbers start at 1. Returns the part's ETag,
    /// which the backend requires to complete the upload.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> StorageResult<String> {
        debug!(
            "Uploading part {} ({} bytes) of {}",
            part_number,
            data.len(),
            key
        );

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        response
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| StorageError::invalid_response("missing part ETag"))
    }

    /// Complete a multipart upload from `(part_number, etag)` pairs.
    pub async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[(i32, String)],
    ) -> StorageResult<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|(number, etag)| {
                CompletedPart::builder()
                    .part_number(*number)
                    .e_tag(etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Completed multipart upload for {}", key);
        Ok(())
    }

    /// Abort a multipart upload, discarding its parts.
    pub async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        debug!("Aborted multipart upload {} for {}", upload_id, key);
        Ok(())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("Spaces connectivity check failed: {}", e)))?;
        Ok(())
    }
}
