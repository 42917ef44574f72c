//! Work queue over Redis Streams.
//!
//! Delivery semantics: `XREADGROUP` hands an item to exactly one consumer,
//! but an unacked item becomes claimable again once it has been idle for
//! the visibility timeout, so consumers must tolerate redelivery. Items
//! whose receive count reaches the maximum are moved to a dead-letter
//! stream instead of being retried forever.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::work_item::WorkItem;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for work items
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Receive attempts before dead-lettering
    pub max_receive_count: u32,
    /// How long a delivered item stays invisible to other consumers.
    /// Must be strictly greater than the worst-case processing duration.
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vsplit:work".to_string(),
            consumer_group: "vsplit:workers".to_string(),
            dlq_stream_name: "vsplit:dlq".to_string(),
            max_receive_count: 3,
            visibility_timeout: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "vsplit:work".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vsplit:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "vsplit:dlq".to_string()),
            max_receive_count: std::env::var("QUEUE_MAX_RECEIVE_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
        }
    }
}

/// Work queue client.
pub struct WorkQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl WorkQueue {
    /// Create a new work queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create the consumer group if needed).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a work item. Returns the stream message id.
    pub async fn enqueue(&self, item: &WorkItem) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(item)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("item")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(job_id = %item.job_id, message_id = %message_id, "Enqueued work item");
        Ok(message_id)
    }

    /// Receive new work items for `consumer_name`.
    ///
    /// Count is one per receive so a single failure never takes other
    /// items down with it; `block_ms` bounds the poll.
    pub async fn receive(
        &self,
        consumer_name: &str,
        block_ms: u64,
    ) -> QueueResult<Vec<(String, WorkItem)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(item) = self.decode_entry(&entry).await {
                    items.push((entry.id.clone(), item));
                }
            }
        }

        Ok(items)
    }

    /// Claim items another consumer received but left idle past the
    /// visibility timeout (crashed or stalled worker recovery).
    pub async fn claim_stale(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, WorkItem)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let reply: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.visibility_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::new();
        for entry in reply.ids {
            if let Some(item) = self.decode_entry(&entry).await {
                info!(message_id = %entry.id, "Claimed stale work item");
                items.push((entry.id.clone(), item));
            }
        }

        Ok(items)
    }

    async fn decode_entry(&self, entry: &redis::streams::StreamId) -> Option<WorkItem> {
        let redis::Value::BulkString(payload) = entry.map.get("item")? else {
            return None;
        };

        match serde_json::from_slice::<WorkItem>(payload) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(message_id = %entry.id, "Dropping malformed work item: {}", e);
                // ack so a poison message does not loop forever
                self.ack(&entry.id).await.ok();
                None
            }
        }
    }

    /// Acknowledge an item (processing finished, success or permanent failure).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id = %message_id, "Acked work item");
        Ok(())
    }

    /// Move an item to the dead-letter stream and ack the original.
    pub async fn dead_letter(
        &self,
        message_id: &str,
        item: &WorkItem,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(item)?;
        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("item")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %item.job_id, "Dead-lettered work item: {}", error);
        Ok(())
    }

    /// Increment and return the receive count for a message.
    pub async fn increment_receive_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = self.receive_count_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        // receive counters outlive any sane redelivery window, then expire
        let _: () = conn.expire(&key, 86400).await?;
        Ok(count)
    }

    fn receive_count_key(&self, message_id: &str) -> String {
        format!("{}:recv:{}", self.config.stream_name, message_id)
    }

    /// Queue depth.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Dead-letter stream depth.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Receive attempts allowed before dead-lettering.
    pub fn max_receive_count(&self) -> u32 {
        self.config.max_receive_count
    }

    /// The configured visibility timeout.
    pub fn visibility_timeout(&self) -> Duration {
        self.config.visibility_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "vsplit:work");
        assert_eq!(config.max_receive_count, 3);
        assert!(config.visibility_timeout > Duration::from_secs(60));
    }

    #[test]
    fn receive_count_key_is_scoped_to_stream() {
        let queue = WorkQueue::new(QueueConfig::default()).unwrap();
        assert_eq!(
            queue.receive_count_key("123-0"),
            "vsplit:work:recv:123-0"
        );
    }
}
