//! DigitalOcean Spaces storage client and the resumable transfer engine.
//!
//! This crate provides:
//! - An S3-compatible Spaces client (upload, multipart primitives,
//!   public URL derivation)
//! - A Google Drive resumable-session client used as an optional mirror
//! - The transfer engine: chunked, resumable, retrying uploads from a
//!   byte buffer or a remote URL stream, with monotonic progress
//!   reporting

pub mod client;
pub mod drive;
pub mod error;
pub mod progress;
pub mod transfer;

pub use client::{SpacesClient, SpacesConfig};
pub use drive::{DriveClient, DriveConfig, DriveFile};
pub use error::{StorageError, StorageResult};
pub use progress::ProgressTracker;
pub use transfer::{MediaTransfer, TransferEngine, TransferError, TransferSource};
