//! Client for the image-to-video generation provider.
//!
//! Wraps Replicate's synchronous prediction endpoint behind the
//! [`VideoGenerator`] trait so the worker can be tested against a fake
//! provider.

pub mod client;
pub mod error;

pub use client::{GenerationRequest, ReplicateClient, ReplicateConfig, VideoGenerator};
pub use error::{ProviderError, ProviderResult};
