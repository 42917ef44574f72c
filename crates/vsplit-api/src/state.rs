//! Application state.

use std::sync::Arc;

use vsplit_queue::WorkQueue;
use vsplit_storage::{BlobStore, DeliveryConfig};
use vsplit_store::JobStore;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<BlobStore>,
    pub store: Arc<JobStore>,
    pub queue: Arc<WorkQueue>,
    pub delivery: DeliveryConfig,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = BlobStore::from_env().await?;
        let store = JobStore::from_env()?;
        let queue = WorkQueue::from_env()?;
        queue.init().await?;

        Ok(Self {
            config,
            storage: Arc::new(storage),
            store: Arc::new(store),
            queue: Arc::new(queue),
            delivery: DeliveryConfig::from_env(),
        })
    }
}
