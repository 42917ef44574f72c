//! S3-compatible blob store client for source media and output parts.
//!
//! This crate provides:
//! - Object upload/download/head against any S3-compatible endpoint
//! - Presigned, time-limited GET URLs for output delivery

pub mod client;
pub mod delivery;
pub mod error;

pub use client::{BlobStore, BlobStoreConfig, ObjectStat};
pub use delivery::{DeliveryConfig, OutputUrl, DEFAULT_OUTPUT_URL_EXPIRY_SECS, MAX_EXPIRY_SECS};
pub use error::{StorageError, StorageResult};
