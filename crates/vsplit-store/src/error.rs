//! Status store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn already_exists(job_id: impl Into<String>) -> Self {
        Self::AlreadyExists(job_id.into())
    }

    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound(job_id.into())
    }

    /// True when the record simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
