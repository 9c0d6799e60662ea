//! Replicate prediction client.
//!
//! Uses the synchronous model endpoint (`Prefer: wait`) so a single POST
//! blocks until the prediction finishes and returns the output video URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use vgen_models::GenerationParams;

use crate::error::{ProviderError, ProviderResult};

/// Default model when `REPLICATE_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "kwaivgi/kling-v1.6-standard";

const DEFAULT_API_BASE: &str = "https://api.replicate.com";

/// Input for one image-to-video prediction.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    /// Source image URL fed to the model as the start frame
    pub start_image: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: String,
    pub duration: u32,
    pub cfg_scale: f64,
}

impl GenerationRequest {
    /// Build a request from a resolved image URL and batch parameters.
    pub fn new(image_url: impl Into<String>, params: &GenerationParams) -> Self {
        Self {
            start_image: image_url.into(),
            prompt: params.prompt.clone(),
            negative_prompt: params.negative_prompt.clone(),
            aspect_ratio: params.aspect_ratio.clone(),
            duration: params.duration,
            cfg_scale: params.cfg_scale,
        }
    }
}

/// Abstraction over the generation provider, for dependency injection
/// in worker tests.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Run one generation to completion and return the output video URL.
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<String>;
}

/// Replicate client configuration.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// API token (`REPLICATE_API_TOKEN`)
    pub api_token: String,
    /// Model identifier, `owner/name`
    pub model: String,
    /// API base URL; overridable for tests
    pub api_base: String,
}

impl ReplicateConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        let api_token = std::env::var("REPLICATE_API_TOKEN")
            .map_err(|_| ProviderError::config_error("REPLICATE_API_TOKEN not set"))?;

        Ok(Self {
            api_token,
            model: std::env::var("REPLICATE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_base: std::env::var("REPLICATE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

/// Prediction response body. Only the fields we consume.
#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Replicate API client.
pub struct ReplicateClient {
    http: Client,
    config: ReplicateConfig,
}

impl ReplicateClient {
    /// Create a new client.
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self::new(ReplicateConfig::from_env()?))
    }

    fn predictions_url(&self) -> String {
        format!(
            "{}/v1/models/{}/predictions",
            self.config.api_base, self.config.model
        )
    }
}

#[async_trait]
impl VideoGenerator for ReplicateClient {
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<String> {
        info!(model = %self.config.model, "Running prediction");

        let response = self
            .http
            .post(self.predictions_url())
            .bearer_auth(&self.config.api_token)
            // Hold the connection open until the prediction finishes.
            .header("Prefer", "wait")
            .json(&serde_json::json!({ "input": request }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::prediction_failed(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;

        debug!(status = %prediction.status, "Prediction finished");

        if matches!(prediction.status.as_str(), "failed" | "canceled") {
            let reason = match prediction.error {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => prediction.status,
            };
            return Err(ProviderError::prediction_failed(reason));
        }

        extract_output_url(prediction.output)
    }
}

/// Pull the video URL out of the prediction output, which the API
/// returns either as a plain string or as an array of strings.
fn extract_output_url(output: Option<Value>) -> ProviderResult<String> {
    match output {
        Some(Value::String(url)) if !url.is_empty() => Ok(url),
        Some(Value::Array(items)) => items
            .into_iter()
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .ok_or(ProviderError::NoOutput),
        Some(Value::Null) | None => Err(ProviderError::NoOutput),
        Some(other) => Err(ProviderError::invalid_response(format!(
            "unexpected output shape: {}",
            other
        ))),
    }
}
