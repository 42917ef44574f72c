//! Output broker handlers.
//!
//! Issues signed, time-limited retrieval URLs for completed parts. Output
//! bytes go straight from the blob store to the caller; nothing streams
//! through this process.

use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use vsplit_models::{JobId, JobStatus};
use vsplit_storage::OutputUrl;

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::is_valid_job_id;
use crate::state::AppState;

/// GET /jobs/{job_id}/outputs/{filename}
///
/// Returns:
/// - 200: `{download_url, expires_in, size}`
/// - 404: unknown job, failed job, or filename not among the results
/// - 409: job still queued or processing
pub async fn get_output_url(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> ApiResult<Json<OutputUrl>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }
    if !is_valid_output_filename(&filename) {
        return Err(ApiError::bad_request("Invalid output filename"));
    }

    let job = state
        .store
        .get(&JobId::from_string(&job_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    match job.status {
        JobStatus::Queued | JobStatus::Processing => {
            Err(ApiError::not_ready("job outputs are not ready yet"))
        }
        JobStatus::Failed => Err(ApiError::not_found("job failed; outputs are unavailable")),
        JobStatus::Completed => {
            let part = job
                .results
                .iter()
                .find(|p| p.filename == filename)
                .ok_or_else(|| ApiError::not_found("no such output for this job"))?;

            let url = state
                .delivery
                .issue_url(&state.storage, &part.output_reference, part.size)
                .await?;

            info!(job_id = %job_id, filename = %filename, "Issued output URL");
            Ok(Json(url))
        }
    }
}

/// Validate an output filename as a single path segment.
fn is_valid_output_filename(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_guard() {
        assert!(is_valid_output_filename("abc-123_part_000.mp4"));
        assert!(!is_valid_output_filename(""));
        assert!(!is_valid_output_filename("a/b.mp4"));
        assert!(!is_valid_output_filename("a..b.mp4"));
        assert!(!is_valid_output_filename(&"a".repeat(129)));
    }
}
