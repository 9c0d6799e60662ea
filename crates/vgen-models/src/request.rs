//! Intake request shape and boundary normalization.
//!
//! The submission payload arrives as loosely-typed JSON. Everything is
//! normalized here, at the system boundary, before any core component
//! sees it; ambiguous shapes are rejected as [`ValidationError`] rather
//! than coerced silently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::params::GenerationParams;

/// Errors for malformed batch/job input.
///
/// Surfaced immediately to the submitter; a batch that fails validation
/// is never enqueued.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("No images provided")]
    EmptyBatch,

    #[error("Invalid image data format at index {index}: expected an object with name and url")]
    InvalidImageShape { index: usize },

    #[error("Image at index {index} has no resolvable URL: {reason}")]
    UnresolvableUrl { index: usize, reason: String },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A normalized source image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Human-readable name, used for the output filename
    #[serde(default)]
    pub name: String,
    /// Resolvable URL of the image
    pub url: String,
}

impl ImageSource {
    /// Normalize a loose JSON value into an `ImageSource`.
    ///
    /// Only the `{name, url}` object shape is accepted. Plain strings and
    /// other shapes are ambiguous (is it a name or a URL?) and rejected.
    pub fn normalize(value: &Value, index: usize) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or(ValidationError::InvalidImageShape { index })?;

        let url = obj
            .get("url")
            .and_then(Value::as_str)
            .ok_or(ValidationError::InvalidImageShape { index })?
            .to_string();

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let source = Self { name, url };
        source.check_url(index)?;
        Ok(source)
    }

    /// Verify the URL parses and carries a fetchable scheme.
    pub fn check_url(&self, index: usize) -> Result<(), ValidationError> {
        let parsed = Url::parse(&self.url).map_err(|e| ValidationError::UnresolvableUrl {
            index,
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ValidationError::UnresolvableUrl {
                index,
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

/// A validated batch submission.
///
/// The wire shape is `{images, prompt, negative_prompt, aspectRatio,
/// duration, email}`; see [`BatchRequest::from_payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Normalized image references
    pub images: Vec<ImageSource>,
    /// Common generation parameters for every job
    pub params: GenerationParams,
    /// Optional notification target for the batch report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Raw wire payload accepted at the queue-submission boundary.
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    images: Vec<Value>,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    negative_prompt: String,
    #[serde(default, rename = "aspectRatio")]
    aspect_ratio: Option<String>,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default, rename = "cfgScale")]
    cfg_scale: Option<f64>,
    #[serde(default)]
    email: Option<String>,
}

impl BatchRequest {
    /// Parse and validate a raw submission payload.
    pub fn from_payload(payload: &Value) -> Result<Self, ValidationError> {
        let raw: RawPayload =
            serde_json::from_value(payload.clone()).map_err(|e| ValidationError::InvalidField {
                field: "payload",
                reason: e.to_string(),
            })?;

        if raw.images.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let mut images = Vec::with_capacity(raw.images.len());
        for (index, value) in raw.images.iter().enumerate() {
            images.push(ImageSource::normalize(value, index)?);
        }

        let defaults = GenerationParams::default();
        let request = Self {
            images,
            params: GenerationParams {
                prompt: raw.prompt,
                negative_prompt: raw.negative_prompt,
                aspect_ratio: raw.aspect_ratio.unwrap_or(defaults.aspect_ratio),
                duration: raw.duration.unwrap_or(defaults.duration),
                cfg_scale: raw.cfg_scale.unwrap_or(defaults.cfg_scale),
            },
            email: raw.email.filter(|e| !e.trim().is_empty()),
        };
        request.validate()?;
        Ok(request)
    }

    /// Re-check an already-constructed request.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.images.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        for (index, image) in self.images.iter().enumerate() {
            image.check_url(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_payload() {
        let payload = json!({
            "images": [
                {"name": "sunset", "url": "https://example.com/sunset.png"},
                {"name": "dawn", "url": "https://example.com/dawn.png"}
            ],
            "prompt": "slow pan",
            "negative_prompt": "blur",
            "aspectRatio": "9:16",
            "duration": 10,
            "email": "user@example.com"
        });

        let request = BatchRequest::from_payload(&payload).unwrap();
        assert_eq!(request.images.len(), 2);
        assert_eq!(request.images[0].name, "sunset");
        assert_eq!(request.params.aspect_ratio, "9:16");
        assert_eq!(request.params.duration, 10);
        assert_eq!(request.email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn rejects_empty_batch() {
        let payload = json!({"images": [], "prompt": "x"});
        assert!(matches!(
            BatchRequest::from_payload(&payload),
            Err(ValidationError::EmptyBatch)
        ));
    }

    #[test]
    fn rejects_plain_string_image_entries() {
        // A bare string is ambiguous (name or URL?) and must not be coerced.
        let payload = json!({"images": ["https://example.com/a.png"]});
        assert!(matches!(
            BatchRequest::from_payload(&payload),
            Err(ValidationError::InvalidImageShape { index: 0 })
        ));
    }

    #[test]
    fn rejects_entry_without_url() {
        let payload = json!({"images": [{"name": "a"}]});
        assert!(matches!(
            BatchRequest::from_payload(&payload),
            Err(ValidationError::InvalidImageShape { index: 0 })
        ));
    }

    #[test]
    fn rejects_unresolvable_url() {
        let payload = json!({"images": [{"name": "a", "url": "not a url"}]});
        assert!(matches!(
            BatchRequest::from_payload(&payload),
            Err(ValidationError::UnresolvableUrl { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let payload = json!({"images": [{"name": "a", "url": "file:///etc/passwd"}]});
        assert!(matches!(
            BatchRequest::from_payload(&payload),
            Err(ValidationError::UnresolvableUrl { index: 0, .. })
        ));
    }

    #[test]
    fn blank_email_is_dropped() {
        let payload = json!({
            "images": [{"name": "a", "url": "https://example.com/a.png"}],
            "email": "  "
        });
        let request = BatchRequest::from_payload(&payload).unwrap();
        assert!(request.email.is_none());
    }

    #[test]
    fn missing_parameters_take_defaults() {
        let payload = json!({"images": [{"name": "a", "url": "https://example.com/a.png"}]});
        let request = BatchRequest::from_payload(&payload).unwrap();
        assert_eq!(request.params.aspect_ratio, "16:9");
        assert_eq!(request.params.duration, 5);
        assert_eq!(request.params.cfg_scale, 0.5);
    }
}
