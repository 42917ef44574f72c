//! Media splitting worker.
//!
//! This crate provides:
//! - The executor loop consuming the work queue
//! - The split processor (download, plan, encode, upload, record)
//! - Transient/permanent error classification
//! - Retry utilities with exponential backoff

pub mod config;
pub mod error;
pub mod executor;
pub mod processor;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{ErrorClass, WorkerError, WorkerResult};
pub use executor::WorkExecutor;
pub use processor::ProcessingContext;
