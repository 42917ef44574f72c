//! Submission gateway and status query handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use vsplit_models::{Job, JobId, OutputFormat, SplitConfig};
use vsplit_queue::WorkItem;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Request body for job submission.
///
/// Wire shape: `{source_reference, method, parameters, output_format?}`.
/// Unknown methods fail deserialization, so every accepted request carries a
/// fully-typed split configuration.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// Blob-store key of the source media
    #[validate(length(min = 1, max = 512))]
    pub source_reference: String,

    /// Split method and parameters
    #[serde(flatten)]
    pub split_config: SplitConfig,

    /// Output container format
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Response for an accepted submission.
#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: String,
}

/// Snapshot returned by the status query endpoint.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub progress: u8,
    pub results: Vec<PartSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorView>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PartSummary {
    pub index: u32,
    pub filename: String,
    pub duration: f64,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct JobErrorView {
    pub code: String,
    pub message: String,
}

impl JobStatusResponse {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            status: job.status.to_string(),
            progress: job.progress,
            results: job
                .results
                .iter()
                .map(|p| PartSummary {
                    index: p.index,
                    filename: p.filename.clone(),
                    duration: p.duration,
                    size: p.size,
                })
                .collect(),
            error: job.error.as_ref().map(|e| JobErrorView {
                code: e.code.clone(),
                message: e.message.clone(),
            }),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /jobs
///
/// Validates the request, writes the job record, enqueues the work item,
/// and returns immediately. If enqueueing fails after the record was
/// written, the record is deleted so no queued-forever orphan remains.
///
/// Returns:
/// - 202: `{job_id, status: "queued"}`
/// - 400: invalid input or unresolvable source
/// - 502: the work queue rejected the item
pub async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    // Parse explicitly so malformed bodies and unknown methods surface as
    // 400 rather than the Json extractor's 422.
    let req: SubmitJobRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("invalid request: {}", e)))?;

    req.validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    if !is_valid_source_reference(&req.source_reference) {
        return Err(ApiError::validation(
            "source_reference contains invalid characters",
        ));
    }

    req.split_config
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    if !state.storage.exists(&req.source_reference).await? {
        return Err(ApiError::bad_request(format!(
            "source_reference {} is not resolvable",
            req.source_reference
        )));
    }

    let job = Job::new(req.source_reference, req.split_config, req.output_format);
    state.store.create(&job).await?;

    let item = WorkItem::for_job(&job);
    if let Err(e) = state.queue.enqueue(&item).await {
        warn!(job_id = %job.job_id, "Enqueue failed, compensating: {}", e);
        if let Err(delete_err) = state.store.delete(&job.job_id).await {
            error!(
                job_id = %job.job_id,
                "Failed to delete job record after enqueue failure: {}", delete_err
            );
        }
        return Err(ApiError::upstream("failed to enqueue job"));
    }

    metrics::record_job_submitted(job.split_config.method_name());
    info!(
        job_id = %job.job_id,
        method = job.split_config.method_name(),
        "Job submitted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.job_id.to_string(),
            status: job.status.to_string(),
        }),
    ))
}

/// GET /jobs/{job_id}
///
/// Bounded-latency snapshot of the job record: one meta read plus one parts
/// read, independent of how much processing remains. Never touches the
/// queue or the workers.
///
/// Returns:
/// - 200: job snapshot
/// - 404: unknown or expired job_id
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }

    let job = state
        .store
        .get(&JobId::from_string(job_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(JobStatusResponse::from_job(&job)))
}

// ============================================================================
// Helpers
// ============================================================================

/// Validate job ID format to prevent injection into store keys.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
pub fn is_valid_job_id(id: &str) -> bool {
    if id.len() > 64 || id.len() < 8 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Validate a source reference as a sane object key.
fn is_valid_source_reference(key: &str) -> bool {
    !key.starts_with('/')
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_job_ids() {
        assert!(is_valid_job_id("12345678"));
        assert!(is_valid_job_id("abc-1234-def"));
        assert!(is_valid_job_id("0aa2b9c8-6f3e-4a8a-bb1e-0c8f6f1e2d3c"));
    }

    #[test]
    fn invalid_job_ids() {
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("has space"));
        assert!(!is_valid_job_id("has_underscore"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }

    #[test]
    fn source_reference_guard() {
        assert!(is_valid_source_reference("sources/video1.mkv"));
        assert!(is_valid_source_reference("user-1/media_2024.mp4"));
        assert!(!is_valid_source_reference("/absolute/path.mkv"));
        assert!(!is_valid_source_reference("a/../b.mkv"));
        assert!(!is_valid_source_reference("bad key.mkv"));
    }

    #[test]
    fn submit_request_parses_spec_wire_shape() {
        let body = serde_json::json!({
            "source_reference": "sources/video1.mkv",
            "method": "intervals",
            "parameters": { "interval_duration": 300.0 }
        });
        let req: SubmitJobRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.output_format, OutputFormat::Mp4);
        assert_eq!(req.split_config.method_name(), "intervals");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn submit_request_rejects_unknown_method() {
        let body = serde_json::json!({
            "source_reference": "sources/video1.mkv",
            "method": "by_scene",
            "parameters": {}
        });
        assert!(serde_json::from_value::<SubmitJobRequest>(body).is_err());
    }

    #[test]
    fn submit_request_rejects_empty_source() {
        let body = serde_json::json!({
            "source_reference": "",
            "method": "keyframes",
            "parameters": { "interval": 60.0 }
        });
        let req: SubmitJobRequest = serde_json::from_value(body).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn status_response_shape() {
        let mut job = Job::new(
            "sources/video1.mkv",
            SplitConfig::Intervals {
                interval_duration: 300.0,
            },
            OutputFormat::Mp4,
        );
        job.record_part(vsplit_models::Part::new(
            0,
            "abc_part_000.mp4",
            300.0,
            2048,
            "outputs/abc/abc_part_000.mp4",
        ));

        let response = JobStatusResponse::from_job(&job);
        assert_eq!(response.status, "queued");
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].filename, "abc_part_000.mp4");
        assert!(response.error.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["results"][0]["index"], 0);
    }
}
