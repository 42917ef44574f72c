//! Job lifecycle types and the per-job state machine.
//!
//! Every mutation on [`Job`] is idempotent and commutative so that two
//! workers racing near a visibility-timeout boundary cannot corrupt the
//! record. The status store applies the same semantics atomically; the
//! methods here are the reference implementation and the unit under test.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::part::Part;
use crate::split::{OutputFormat, SplitConfig};

/// Error code for jobs that exhausted their redelivery budget.
pub const ERROR_MAX_RETRIES: &str = "max_retries_exceeded";
/// Error code for source media that cannot be read from the blob store.
pub const ERROR_SOURCE_UNREADABLE: &str = "source_unreadable";
/// Error code for corrupt or unsupported source media.
pub const ERROR_UNSUPPORTED_MEDIA: &str = "unsupported_media";
/// Error code for split plans that cannot be satisfied.
pub const ERROR_INVALID_PLAN: &str = "invalid_plan";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
///
/// Transitions are strictly forward: queued -> processing -> {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued waiting for a worker
    #[default]
    Queued,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A split job and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub job_id: JobId,

    /// Blob-store key of the source media
    pub source_reference: String,

    /// Split method and parameters
    pub split_config: SplitConfig,

    /// Container format for output parts
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Blob-store prefix all output parts are written under
    pub output_prefix: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress percentage (0-100), monotonically non-decreasing
    #[serde(default)]
    pub progress: u8,

    /// Total number of planned parts, set once at plan time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<u32>,

    /// Completed parts, ordered by index. Persisted in a separate parts
    /// hash and reassembled on read, never inside the meta document.
    #[serde(default, skip)]
    pub results: Vec<Part>,

    /// Error recorded when the job failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job with a fresh ID.
    pub fn new(
        source_reference: impl Into<String>,
        split_config: SplitConfig,
        output_format: OutputFormat,
    ) -> Self {
        let job_id = JobId::new();
        let now = Utc::now();

        Self {
            output_prefix: format!("outputs/{}", job_id),
            job_id,
            source_reference: source_reference.into(),
            split_config,
            output_format,
            status: JobStatus::Queued,
            progress: 0,
            total_parts: None,
            results: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition queued -> processing. No-op in any other state.
    pub fn start_processing(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
            self.touch();
        }
    }

    /// Record the planned part count. Set-once; later calls are no-ops.
    pub fn set_total_parts(&mut self, total: u32) {
        if self.total_parts.is_none() {
            self.total_parts = Some(total);
            self.touch();
        }
    }

    /// Append a completed part if its index is not already present.
    ///
    /// Returns `true` if the part was newly recorded. Duplicate deliveries
    /// replaying the same part are absorbed; insertion keeps `results`
    /// ordered by index regardless of arrival order.
    pub fn record_part(&mut self, part: Part) -> bool {
        if self.results.iter().any(|p| p.index == part.index) {
            return false;
        }
        let pos = self
            .results
            .iter()
            .position(|p| p.index > part.index)
            .unwrap_or(self.results.len());
        self.results.insert(pos, part);
        self.touch();
        true
    }

    /// Advance progress to `max(current, value)`, clamped to 100.
    pub fn advance_progress(&mut self, value: u8) {
        let value = value.min(100);
        if value > self.progress {
            self.progress = value;
            self.touch();
        }
    }

    /// Transition to completed. Only valid from queued/processing.
    pub fn complete(&mut self) {
        if !self.is_terminal() {
            self.status = JobStatus::Completed;
            self.progress = 100;
            self.touch();
        }
    }

    /// Transition to failed with a structured error. Only valid from
    /// queued/processing; the first recorded error wins. Partial results
    /// already appended are retained for diagnostics.
    pub fn fail(&mut self, error: JobError) {
        if !self.is_terminal() {
            self.status = JobStatus::Failed;
            self.error = Some(error);
            self.touch();
        }
    }

    /// Progress value for `completed` out of `total` parts.
    pub fn progress_for(completed: u32, total: u32) -> u8 {
        if total == 0 {
            return 0;
        }
        ((completed.min(total) as u64 * 100) / total as u64) as u8
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::part_filename;

    fn test_job() -> Job {
        Job::new(
            "sources/video1.mkv",
            SplitConfig::Intervals {
                interval_duration: 300.0,
            },
            OutputFormat::Mp4,
        )
    }

    fn test_part(job: &Job, index: u32) -> Part {
        let filename = part_filename(&job.job_id, index, job.output_format);
        Part::new(index, filename, 300.0, 1024, format!("{}/p{}", job.output_prefix, index))
    }

    #[test]
    fn new_job_is_queued_with_zero_progress() {
        let job = test_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.results.is_empty());
        assert!(job.error.is_none());
        assert!(job.output_prefix.starts_with("outputs/"));
    }

    #[test]
    fn transitions_are_strictly_forward() {
        let mut job = test_job();

        job.start_processing();
        assert_eq!(job.status, JobStatus::Processing);

        // start_processing is a no-op once out of queued
        job.start_processing();
        assert_eq!(job.status, JobStatus::Processing);

        job.complete();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);

        // terminal states absorb further transitions
        job.fail(JobError::new(ERROR_MAX_RETRIES, "late failure"));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn fail_is_terminal_and_keeps_first_error() {
        let mut job = test_job();
        job.start_processing();
        job.fail(JobError::new(ERROR_UNSUPPORTED_MEDIA, "bad codec"));
        job.fail(JobError::new(ERROR_MAX_RETRIES, "second"));

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_ref().unwrap().code, ERROR_UNSUPPORTED_MEDIA);

        job.complete();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn record_part_is_idempotent_and_ordered() {
        let mut job = test_job();
        let p1 = test_part(&job, 1);
        let p0 = test_part(&job, 0);

        assert!(job.record_part(p1.clone()));
        assert!(job.record_part(p0));
        assert!(!job.record_part(p1));

        let indices: Vec<u32> = job.results.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn duplicate_replay_yields_identical_results() {
        // Simulate the same WorkItem processed twice end to end.
        let mut job = test_job();
        let parts: Vec<Part> = (0..3).map(|i| test_part(&job, i)).collect();

        for _ in 0..2 {
            job.start_processing();
            job.set_total_parts(3);
            for (i, part) in parts.iter().enumerate() {
                job.record_part(part.clone());
                job.advance_progress(Job::progress_for(i as u32 + 1, 3));
            }
            job.complete();
        }

        assert_eq!(job.results.len(), 3);
        assert_eq!(job.progress, 100);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn progress_never_regresses() {
        let mut job = test_job();
        job.advance_progress(60);
        // out-of-order duplicate delivery reports an older value
        job.advance_progress(40);
        assert_eq!(job.progress, 60);
        job.advance_progress(200);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn failed_job_retains_partial_results() {
        let mut job = test_job();
        job.start_processing();
        job.record_part(test_part(&job, 0));
        job.fail(JobError::new(ERROR_MAX_RETRIES, "redelivery budget exhausted"));

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.results.len(), 1);
    }

    #[test]
    fn set_total_parts_is_set_once() {
        let mut job = test_job();
        job.set_total_parts(4);
        job.set_total_parts(9);
        assert_eq!(job.total_parts, Some(4));
    }

    #[test]
    fn progress_for_rounds_down() {
        assert_eq!(Job::progress_for(0, 3), 0);
        assert_eq!(Job::progress_for(1, 3), 33);
        assert_eq!(Job::progress_for(2, 3), 66);
        assert_eq!(Job::progress_for(3, 3), 100);
        assert_eq!(Job::progress_for(5, 0), 0);
    }
}
