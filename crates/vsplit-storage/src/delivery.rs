//! Time-limited output delivery URLs.
//!
//! The broker hands out presigned URLs directly against the blob store;
//! output bytes never transit the API process.

use std::time::Duration;

use serde::Serialize;

use crate::client::BlobStore;
use crate::error::StorageResult;

/// Default expiry for output download URLs (1 hour).
pub const DEFAULT_OUTPUT_URL_EXPIRY_SECS: u64 = 3600;

/// Maximum allowed expiry (7 days) to prevent long-lived URL leakage.
pub const MAX_EXPIRY_SECS: u64 = 604800;

/// Delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Expiry applied to issued URLs.
    pub url_expiry: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            url_expiry: Duration::from_secs(DEFAULT_OUTPUT_URL_EXPIRY_SECS),
        }
    }
}

impl DeliveryConfig {
    /// Create config from environment variables, clamping the expiry.
    pub fn from_env() -> Self {
        Self {
            url_expiry: Duration::from_secs(
                std::env::var("OUTPUT_URL_EXPIRY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_OUTPUT_URL_EXPIRY_SECS)
                    .min(MAX_EXPIRY_SECS),
            ),
        }
    }

    /// Issue a signed retrieval URL for an output object.
    pub async fn issue_url(
        &self,
        storage: &BlobStore,
        key: &str,
        size: u64,
    ) -> StorageResult<OutputUrl> {
        let url = storage.presign_get(key, self.url_expiry).await?;
        Ok(OutputUrl {
            download_url: url,
            expires_in: self.url_expiry.as_secs(),
            size,
        })
    }
}

/// A signed, time-limited retrieval URL with metadata.
#[derive(Debug, Clone, Serialize)]
pub struct OutputUrl {
    /// Presigned URL against the blob store
    pub download_url: String,
    /// Seconds until the URL expires
    pub expires_in: u64,
    /// Object size in bytes
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expiry_is_one_hour() {
        let config = DeliveryConfig::default();
        assert_eq!(config.url_expiry, Duration::from_secs(3600));
    }
}
