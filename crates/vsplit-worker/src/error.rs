//! Worker error types and transient/permanent classification.

use thiserror::Error;

use vsplit_media::MediaError;
use vsplit_models::{JobError, ERROR_INVALID_PLAN, ERROR_SOURCE_UNREADABLE, ERROR_UNSUPPORTED_MEDIA};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vsplit_storage::StorageError),

    #[error("Store error: {0}")]
    Store(#[from] vsplit_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vsplit_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Processing deadline of {0}s exceeded")]
    DeadlineExceeded(u64),
}

/// How a processing failure should be handled.
#[derive(Debug)]
pub enum ErrorClass {
    /// Leave the work item unacked so the queue redelivers it.
    Transient,
    /// Ack immediately and fail the job; retrying cannot help.
    Permanent(JobError),
}

impl WorkerError {
    /// Classify this error per the retry policy.
    ///
    /// Permanent: the source itself is unusable (missing, corrupt,
    /// unsupported) or the plan cannot be satisfied. Everything else --
    /// blob store I/O, store/queue hiccups, timeouts -- is worth a
    /// redelivery.
    pub fn classify(&self) -> ErrorClass {
        match self {
            WorkerError::Media(e) => classify_media(e),
            WorkerError::Storage(e) if e.is_not_found() => ErrorClass::Permanent(JobError::new(
                ERROR_SOURCE_UNREADABLE,
                e.to_string(),
            )),
            _ => ErrorClass::Transient,
        }
    }
}

fn classify_media(e: &MediaError) -> ErrorClass {
    match e {
        MediaError::InvalidPlan(msg) => {
            ErrorClass::Permanent(JobError::new(ERROR_INVALID_PLAN, msg.clone()))
        }
        MediaError::InvalidVideo(msg) => {
            ErrorClass::Permanent(JobError::new(ERROR_UNSUPPORTED_MEDIA, msg.clone()))
        }
        // a downloaded source ffprobe cannot read is corrupt, not flaky
        MediaError::FfprobeFailed { message, .. } => {
            ErrorClass::Permanent(JobError::new(ERROR_UNSUPPORTED_MEDIA, message.clone()))
        }
        MediaError::FfmpegFailed { stderr, .. } if stderr_is_permanent(stderr.as_deref()) => {
            ErrorClass::Permanent(JobError::new(
                ERROR_UNSUPPORTED_MEDIA,
                stderr.clone().unwrap_or_default(),
            ))
        }
        _ => ErrorClass::Transient,
    }
}

/// FFmpeg stderr patterns that indicate an unusable source rather than a
/// flaky environment.
fn stderr_is_permanent(stderr: Option<&str>) -> bool {
    let Some(stderr) = stderr else {
        return false;
    };
    let msg = stderr.to_lowercase();

    [
        "invalid data found when processing input",
        "moov atom not found",
        "could not find codec",
        "decoder not found",
        "unsupported codec",
        "unknown format",
        "end of file",
    ]
    .iter()
    .any(|p| msg.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_plan_is_permanent() {
        let err = WorkerError::Media(MediaError::invalid_plan("inverted range"));
        match err.classify() {
            ErrorClass::Permanent(e) => assert_eq!(e.code, ERROR_INVALID_PLAN),
            other => panic!("expected permanent, got {other:?}"),
        }
    }

    #[test]
    fn missing_source_is_permanent() {
        let err = WorkerError::Storage(vsplit_storage::StorageError::not_found("sources/x.mkv"));
        match err.classify() {
            ErrorClass::Permanent(e) => assert_eq!(e.code, ERROR_SOURCE_UNREADABLE),
            other => panic!("expected permanent, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_source_stderr_is_permanent() {
        let err = WorkerError::Media(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some("in.mkv: Invalid data found when processing input".to_string()),
            Some(1),
        ));
        match err.classify() {
            ErrorClass::Permanent(e) => assert_eq!(e.code, ERROR_UNSUPPORTED_MEDIA),
            other => panic!("expected permanent, got {other:?}"),
        }
    }

    #[test]
    fn io_and_timeouts_are_transient() {
        let err = WorkerError::Media(MediaError::Timeout(600));
        assert!(matches!(err.classify(), ErrorClass::Transient));

        let err = WorkerError::DeadlineExceeded(1500);
        assert!(matches!(err.classify(), ErrorClass::Transient));

        let err = WorkerError::Storage(vsplit_storage::StorageError::upload_failed("503"));
        assert!(matches!(err.classify(), ErrorClass::Transient));

        let err = WorkerError::Media(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some("Connection reset by peer".to_string()),
            Some(1),
        ));
        assert!(matches!(err.classify(), ErrorClass::Transient));
    }
}
