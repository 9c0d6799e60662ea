//! Generation parameters shared by every job in a batch.

use serde::{Deserialize, Serialize};

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_duration() -> u32 {
    5
}

fn default_cfg_scale() -> f64 {
    0.5
}

/// Parameters for one image-to-video generation.
///
/// Immutable once the job starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Positive prompt
    #[serde(default)]
    pub prompt: String,
    /// Negative prompt
    #[serde(default)]
    pub negative_prompt: String,
    /// Target aspect ratio, e.g. "16:9"
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    /// Clip duration in seconds
    #[serde(default = "default_duration")]
    pub duration: u32,
    /// Classifier-free guidance scale
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            aspect_ratio: default_aspect_ratio(),
            duration: default_duration(),
            cfg_scale: default_cfg_scale(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_provider_expectations() {
        let p = GenerationParams::default();
        assert_eq!(p.aspect_ratio, "16:9");
        assert_eq!(p.duration, 5);
        assert_eq!(p.cfg_scale, 0.5);
    }

    #[test]
    fn missing_fields_take_defaults_on_deserialize() {
        let p: GenerationParams = serde_json::from_str(r#"{"prompt":"a cat"}"#).unwrap();
        assert_eq!(p.prompt, "a cat");
        assert_eq!(p.duration, 5);
        assert_eq!(p.aspect_ratio, "16:9");
    }
}
