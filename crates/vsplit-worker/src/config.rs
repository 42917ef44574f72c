//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs per worker instance
    pub max_concurrent_jobs: usize,
    /// Per-job processing deadline. Must stay below the queue's
    /// visibility timeout or an in-flight job gets redelivered.
    pub job_timeout: Duration,
    /// Per-segment FFmpeg timeout
    pub segment_timeout: Duration,
    /// Graceful shutdown drain window
    pub shutdown_timeout: Duration,
    /// Scratch directory for downloaded sources and encoded parts
    pub work_dir: String,
    /// How often to scan for stale pending items from crashed workers
    pub claim_interval: Duration,
    /// How long a receive poll blocks
    pub poll_block: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(1500), // 25 minutes
            segment_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/vsplit".to_string(),
            claim_interval: Duration::from_secs(30),
            poll_block: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1500),
            ),
            segment_timeout: Duration::from_secs(
                std::env::var("WORKER_SEGMENT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| "/tmp/vsplit".to_string()),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            poll_block: Duration::from_secs(
                std::env::var("WORKER_POLL_BLOCK_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_stays_below_default_visibility_timeout() {
        let config = WorkerConfig::default();
        let queue = vsplit_queue::QueueConfig::default();
        assert!(config.job_timeout < queue.visibility_timeout);
    }
}
