//! Redis Streams dispatch queue.
//!
//! This crate provides:
//! - Batch submission enqueueing via Redis Streams
//! - Worker consumption through a consumer group (at-least-once)
//! - Retry accounting and a dead letter stream for poisoned batches

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::ProcessBatchJob;
pub use queue::{DispatchQueue, QueueConfig};
