//! The split processor.
//!
//! Everything here must tolerate redelivery: parts already recorded are
//! skipped, output keys are deterministic so re-encoding overwrites, and
//! every store mutation is idempotent.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use vsplit_media::{compute_plan, probe_media, SegmentEncoder};
use vsplit_models::{output_key, part_filename, EncodingConfig, Job, Part};
use vsplit_queue::WorkItem;
use vsplit_storage::BlobStore;
use vsplit_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Shared dependencies for job processing.
pub struct ProcessingContext {
    pub storage: Arc<BlobStore>,
    pub store: Arc<JobStore>,
    pub config: WorkerConfig,
    encoder: SegmentEncoder,
}

impl ProcessingContext {
    /// Create a processing context from the environment.
    pub async fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let storage = BlobStore::from_env().await?;
        let store = JobStore::from_env()?;

        Ok(Self {
            storage: Arc::new(storage),
            store: Arc::new(store),
            config,
            encoder: SegmentEncoder::new(EncodingConfig::default()),
        })
    }
}

/// Process one work item to completion.
///
/// Flow: load job state, mark processing, fetch the source, compute the
/// split plan, encode/upload/record each missing part in index order, then
/// finalize. Errors propagate to the executor, which classifies them and
/// decides between redelivery and permanent failure.
pub async fn process_work_item(ctx: &ProcessingContext, item: &WorkItem) -> WorkerResult<()> {
    let job_id = &item.job_id;

    let Some(job) = ctx.store.get(job_id).await? else {
        // The gateway compensated this job away; nothing left to process.
        warn!(job_id = %job_id, "Job record missing, dropping work item");
        return Ok(());
    };

    if job.is_terminal() {
        info!(job_id = %job_id, status = %job.status, "Job already finalized, dropping duplicate delivery");
        return Ok(());
    }

    ctx.store.mark_processing(job_id).await?;

    tokio::fs::create_dir_all(&ctx.config.work_dir).await?;
    let scratch = tempfile::tempdir_in(&ctx.config.work_dir)?;

    let source_path = scratch.path().join("source");
    ctx.storage
        .download_file(&item.source_reference, &source_path)
        .await?;

    let media = probe_media(&source_path).await?;
    debug!(
        job_id = %job_id,
        duration = media.duration,
        fps = media.fps,
        codec = %media.codec,
        "Probed source"
    );

    let plan = compute_plan(&item.split_config, media.duration)?;
    let total = plan.total_parts();
    ctx.store.set_total_parts(job_id, total).await?;

    // Indices recorded by a prior partial attempt; re-encoding them would
    // only waste work, the outputs are already durable.
    let recorded: HashSet<u32> = job.results.iter().map(|p| p.index).collect();

    for segment in &plan.segments {
        if recorded.contains(&segment.index) {
            debug!(job_id = %job_id, index = segment.index, "Part already recorded, skipping");
            continue;
        }

        let filename = part_filename(job_id, segment.index, job.output_format);
        let key = output_key(&item.output_prefix, &filename);
        let part_path = scratch.path().join(&filename);

        ctx.encoder
            .encode_segment(
                &source_path,
                &part_path,
                &item.split_config,
                segment,
                media.fps,
                ctx.config.segment_timeout,
            )
            .await?;

        let size = tokio::fs::metadata(&part_path).await?.len();

        // The output must be durably written before the part is recorded.
        upload_with_retry(ctx, &part_path, &key, job.output_format.content_type()).await?;

        let part = Part::new(segment.index, filename, segment.duration(), size, key);
        let (added, completed) = ctx.store.append_part(job_id, &part).await?;
        let progress = Job::progress_for(completed, total);
        ctx.store.advance_progress(job_id, progress).await?;

        info!(
            job_id = %job_id,
            index = segment.index,
            newly_added = added,
            progress = progress,
            "Part {}/{} done",
            completed,
            total
        );
    }

    ctx.store.complete(job_id).await?;
    info!(job_id = %job_id, parts = total, "Job completed");

    Ok(())
}

async fn upload_with_retry(
    ctx: &ProcessingContext,
    path: &Path,
    key: &str,
    content_type: &str,
) -> WorkerResult<()> {
    let retry = RetryConfig::new("upload_part").with_max_retries(2);

    match retry_async(&retry, || ctx.storage.upload_file(path, key, content_type)).await {
        RetryResult::Success(_) => Ok(()),
        RetryResult::Failed { error, attempts } => {
            warn!(key = %key, attempts = attempts, "Part upload failed: {}", error);
            Err(WorkerError::Storage(error))
        }
    }
}
