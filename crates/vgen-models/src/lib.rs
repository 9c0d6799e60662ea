//! Shared data models for the VidGen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Batch and job identity
//! - Generation parameters
//! - Intake requests and boundary normalization
//! - Job status records and the batch report

pub mod batch;
pub mod job;
pub mod params;
pub mod request;
pub mod status;

// Re-export common types
pub use batch::{BatchReport, JobOutcome};
pub use job::{BatchId, Job, JobId, JobStatus};
pub use params::GenerationParams;
pub use request::{BatchRequest, ImageSource, ValidationError};
pub use status::StatusRecord;
