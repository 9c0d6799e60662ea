//! Batch video generation worker.
//!
//! This crate provides:
//! - Batch executor consuming submissions from the dispatch queue
//! - Per-job pipeline: generate, mirror progress, upload, record status
//! - Batch coordination with isolated job failures
//! - Email notification when a batch finishes
//! - Graceful shutdown

pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;
pub mod notify;

pub use batch::{process_batch, ProcessingContext};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::BatchExecutor;
pub use logging::JobLogger;
pub use notify::{EmailConfig, Notifier, SmtpNotifier};
