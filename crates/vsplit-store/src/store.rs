//! Job status store over Redis.
//!
//! Layout per job:
//! - `{prefix}:job:{id}` — the job meta document (JSON, no results inside)
//! - `{prefix}:job:{id}:parts` — hash of part index -> Part JSON
//!
//! Status/progress mutations run as Lua scripts so each partial update is
//! atomic. Every mutation is commutative and idempotent: transitions only
//! move forward, progress only advances, parts only append. Two workers
//! racing near a visibility-timeout boundary can interleave any of these
//! in any order and converge on the same record.

use chrono::Utc;
use redis::{AsyncCommands, Script};
use tracing::debug;

use vsplit_models::{Job, JobError, JobId, Part};

use crate::error::{StoreError, StoreResult};

/// Transition queued -> processing; a no-op in any later state.
const MARK_PROCESSING: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return nil end
local job = cjson.decode(raw)
if job.status == 'queued' then
  job.status = 'processing'
  job.updated_at = ARGV[1]
  redis.call('SET', KEYS[1], cjson.encode(job))
end
return job.status
"#;

/// Record the planned part count; set-once.
const SET_TOTAL_PARTS: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return nil end
local job = cjson.decode(raw)
if not job.total_parts then
  job.total_parts = tonumber(ARGV[1])
  job.updated_at = ARGV[2]
  redis.call('SET', KEYS[1], cjson.encode(job))
end
return job.total_parts
"#;

/// progress = max(progress, new); never regresses.
const ADVANCE_PROGRESS: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return nil end
local job = cjson.decode(raw)
local value = tonumber(ARGV[1])
if value > job.progress then
  job.progress = value
  job.updated_at = ARGV[2]
  redis.call('SET', KEYS[1], cjson.encode(job))
end
return job.progress
"#;

/// Finalize as completed; only from a non-terminal state.
const COMPLETE: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return nil end
local job = cjson.decode(raw)
if job.status == 'queued' or job.status == 'processing' then
  job.status = 'completed'
  job.progress = 100
  job.updated_at = ARGV[1]
  redis.call('SET', KEYS[1], cjson.encode(job))
end
return job.status
"#;

/// Finalize as failed; only from a non-terminal state, first error wins.
/// Parts already appended stay behind for diagnostics.
const FAIL: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return nil end
local job = cjson.decode(raw)
if job.status == 'queued' or job.status == 'processing' then
  job.status = 'failed'
  job.error = { code = ARGV[1], message = ARGV[2] }
  job.updated_at = ARGV[3]
  redis.call('SET', KEYS[1], cjson.encode(job))
end
return job.status
"#;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key namespace prefix
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vsplit".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "vsplit".to_string()),
        }
    }
}

/// Pre-parsed mutation scripts.
struct Scripts {
    mark_processing: Script,
    set_total_parts: Script,
    advance_progress: Script,
    complete: Script,
    fail: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            mark_processing: Script::new(MARK_PROCESSING),
            set_total_parts: Script::new(SET_TOTAL_PARTS),
            advance_progress: Script::new(ADVANCE_PROGRESS),
            complete: Script::new(COMPLETE),
            fail: Script::new(FAIL),
        }
    }
}

/// Job status store client.
pub struct JobStore {
    client: redis::Client,
    config: StoreConfig,
    scripts: Scripts,
}

impl JobStore {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            scripts: Scripts::new(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    fn meta_key(&self, job_id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, job_id)
    }

    fn parts_key(&self, job_id: &JobId) -> String {
        format!("{}:job:{}:parts", self.config.key_prefix, job_id)
    }

    /// Create a job record. Fails if the job_id already exists.
    pub async fn create(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        let created: bool = conn.set_nx(self.meta_key(&job.job_id), payload).await?;
        if !created {
            return Err(StoreError::already_exists(job.job_id.as_str()));
        }

        debug!(job_id = %job.job_id, "Created job record");
        Ok(())
    }

    /// Fetch the current job snapshot, results reassembled from the parts
    /// hash and ordered by index. O(1) in processing-time remaining.
    pub async fn get(&self, job_id: &JobId) -> StoreResult<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let raw: Option<String> = conn.get(self.meta_key(job_id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut job: Job = serde_json::from_str(&raw)?;

        let raw_parts: Vec<String> = conn.hvals(self.parts_key(job_id)).await?;
        let mut results = raw_parts
            .iter()
            .map(|p| serde_json::from_str::<Part>(p))
            .collect::<Result<Vec<_>, _>>()?;
        results.sort_by_key(|p| p.index);
        job.results = results;

        Ok(Some(job))
    }

    /// Delete a job record and its parts. Used by the gateway to
    /// compensate when enqueueing fails after the record was written.
    pub async fn delete(&self, job_id: &JobId) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .del(vec![self.meta_key(job_id), self.parts_key(job_id)])
            .await?;
        debug!(job_id = %job_id, "Deleted job record");
        Ok(())
    }

    /// Transition queued -> processing.
    pub async fn mark_processing(&self, job_id: &JobId) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let status: Option<String> = self
            .scripts
            .mark_processing
            .key(self.meta_key(job_id))
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        status
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))
    }

    /// Record the planned part count (set-once).
    pub async fn set_total_parts(&self, job_id: &JobId, total: u32) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let stored: Option<u32> = self
            .scripts
            .set_total_parts
            .key(self.meta_key(job_id))
            .arg(total)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        stored
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))
    }

    /// Append a part if its index is absent. Returns `(newly_added,
    /// completed_count)` so the caller can derive a progress value.
    pub async fn append_part(&self, job_id: &JobId, part: &Part) -> StoreResult<(bool, u32)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(part)?;
        let added: bool = conn
            .hset_nx(self.parts_key(job_id), part.index, payload)
            .await?;
        let completed: u32 = conn.hlen(self.parts_key(job_id)).await?;

        if added {
            debug!(job_id = %job_id, index = part.index, "Appended part");
        }

        Ok((added, completed))
    }

    /// Advance progress to `max(current, value)`.
    pub async fn advance_progress(&self, job_id: &JobId, value: u8) -> StoreResult<u8> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let progress: Option<u8> = self
            .scripts
            .advance_progress
            .key(self.meta_key(job_id))
            .arg(value.min(100))
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        progress.ok_or_else(|| StoreError::not_found(job_id.as_str()))
    }

    /// Finalize the job as completed.
    pub async fn complete(&self, job_id: &JobId) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let status: Option<String> = self
            .scripts
            .complete
            .key(self.meta_key(job_id))
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        status
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))
    }

    /// Finalize the job as failed with a structured error.
    pub async fn fail(&self, job_id: &JobId, error: &JobError) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let status: Option<String> = self
            .scripts
            .fail
            .key(self.meta_key(job_id))
            .arg(&error.code)
            .arg(&error.message)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        status
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))
    }

    /// Connectivity probe.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsplit_models::{OutputFormat, SplitConfig};

    fn store() -> JobStore {
        JobStore::new(StoreConfig::default()).unwrap()
    }

    #[test]
    fn key_naming() {
        let store = store();
        let id = JobId::from_string("abc-123");
        assert_eq!(store.meta_key(&id), "vsplit:job:abc-123");
        assert_eq!(store.parts_key(&id), "vsplit:job:abc-123:parts");
    }

    #[test]
    fn meta_document_excludes_results() {
        // The parts hash is the only home for results; a results array in
        // the meta JSON would not survive the cjson round-trip when empty.
        let mut job = Job::new(
            "sources/a.mkv",
            SplitConfig::Intervals {
                interval_duration: 60.0,
            },
            OutputFormat::Mp4,
        );
        job.results.push(Part::new(0, "f.mp4", 60.0, 10, "k"));

        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("results").is_none());

        let decoded: Job = serde_json::from_value(json).unwrap();
        assert!(decoded.results.is_empty());
        assert_eq!(decoded.job_id, job.job_id);
    }

    #[test]
    fn meta_document_roundtrips_split_config() {
        let job = Job::new(
            "sources/a.mkv",
            SplitConfig::Keyframes { interval: 30.0 },
            OutputFormat::Webm,
        );
        let raw = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.split_config, job.split_config);
        assert_eq!(decoded.output_format, OutputFormat::Webm);
    }
}
