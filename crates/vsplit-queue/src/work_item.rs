//! The queue message referencing a job for processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vsplit_models::{Job, JobId, SplitConfig};

/// A unit of work handed to the worker pool.
///
/// Delivery is at least once; everything the worker does with a WorkItem
/// must tolerate replays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Job this item belongs to
    pub job_id: JobId,
    /// Blob-store key of the source media
    pub source_reference: String,
    /// Split method and parameters
    pub split_config: SplitConfig,
    /// Blob-store prefix for output parts
    pub output_prefix: String,
    /// When the item was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    /// Build the WorkItem for a freshly created job.
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            source_reference: job.source_reference.clone(),
            split_config: job.split_config.clone(),
            output_prefix: job.output_prefix.clone(),
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsplit_models::OutputFormat;

    #[test]
    fn work_item_serde_roundtrip() {
        let job = Job::new(
            "sources/video1.mkv",
            SplitConfig::Intervals {
                interval_duration: 300.0,
            },
            OutputFormat::Mp4,
        );
        let item = WorkItem::for_job(&job);

        let json = serde_json::to_string(&item).expect("serialize WorkItem");
        let decoded: WorkItem = serde_json::from_str(&json).expect("deserialize WorkItem");

        assert_eq!(decoded.job_id, job.job_id);
        assert_eq!(decoded.source_reference, job.source_reference);
        assert_eq!(decoded.split_config, job.split_config);
        assert_eq!(decoded.output_prefix, job.output_prefix);
        assert_eq!(decoded.enqueued_at, item.enqueued_at);
    }

    #[test]
    fn wire_shape_has_required_fields() {
        let job = Job::new(
            "sources/video1.mkv",
            SplitConfig::Keyframes { interval: 60.0 },
            OutputFormat::Mp4,
        );
        let json = serde_json::to_value(WorkItem::for_job(&job)).unwrap();

        for field in [
            "job_id",
            "source_reference",
            "split_config",
            "output_prefix",
            "enqueued_at",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }
}
