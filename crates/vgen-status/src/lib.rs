//! Durable job status store.
//!
//! This crate provides:
//! - The [`StatusStore`] trait: atomic single-key upsert/read of job
//!   status snapshots
//! - A Redis-backed implementation for production
//! - An in-memory implementation for tests and local runs

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StatusError, StatusResult};
pub use memory::MemoryStatusStore;
pub use redis_store::{RedisStatusStore, StatusStoreConfig};
pub use store::StatusStore;
