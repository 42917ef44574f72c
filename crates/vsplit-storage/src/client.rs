//! Blob store client over the S3 API.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the blob store client.
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" for R2-style endpoints)
    pub region: String,
}

impl BlobStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("BLOB_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("BLOB_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("BLOB_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("BLOB_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("BLOB_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("BLOB_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("BLOB_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("BLOB_BUCKET_NAME not set"))?,
            region: std::env::var("BLOB_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Metadata for a stored object.
#[derive(Debug, Clone)]
pub struct ObjectStat {
    /// Size in bytes
    pub size: u64,
    /// Content type, when reported
    pub content_type: Option<String>,
}

/// Blob store client for source media and output parts.
#[derive(Clone)]
pub struct BlobStore {
    client: Client,
    bucket: String,
}

impl BlobStore {
    /// Create a new client from configuration.
    pub async fn new(config: BlobStoreConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vsplit",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(BlobStoreConfig::from_env()?).await
    }

    /// Upload a local file to `key`.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Download an object to a local file, creating parent directories.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Downloading {} to {}", key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        tokio::fs::write(path, &bytes).await?;

        info!("Downloaded {} to {} ({} bytes)", key, path.display(), bytes.len());
        Ok(())
    }

    /// Stat an object. Returns NotFound when it does not exist.
    pub async fn head_object(&self, key: &str) -> StorageResult<ObjectStat> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NotFound") || msg.contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::Sdk(msg)
                }
            })?;

        Ok(ObjectStat {
            size: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response.content_type().map(|s| s.to_string()),
        })
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head_object(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Generate a presigned GET URL valid for `expires_in`.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Check connectivity by heading the bucket.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Sdk(format!("blob store connectivity check failed: {}", e)))?;
        Ok(())
    }
}
