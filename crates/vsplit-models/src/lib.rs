//! Shared data models for the vsplit media-splitting pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, the per-job state machine, and structured job errors
//! - Output parts and deterministic part naming
//! - Split method configuration (intervals, keyframes, explicit ranges)
//! - Encoding configuration

pub mod encoding;
pub mod job;
pub mod part;
pub mod split;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{
    Job, JobError, JobId, JobStatus, ERROR_INVALID_PLAN, ERROR_MAX_RETRIES,
    ERROR_SOURCE_UNREADABLE, ERROR_UNSUPPORTED_MEDIA,
};
pub use part::{output_key, part_filename, Part};
pub use split::{OutputFormat, SplitConfig, SplitValidationError, TimeRange};
