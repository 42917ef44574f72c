//! Work executor.
//!
//! Consumes the work queue with bounded concurrency, recovers items left
//! behind by crashed workers, and applies the retry policy: transient
//! failures go back to the queue, permanent failures finalize the job,
//! exhausted budgets go to the dead-letter stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vsplit_models::{JobError, ERROR_MAX_RETRIES};
use vsplit_queue::{WorkItem, WorkQueue};

use crate::config::WorkerConfig;
use crate::error::{ErrorClass, WorkerError, WorkerResult};
use crate::processor::{process_work_item, ProcessingContext};

/// Executor that processes work items from the queue.
pub struct WorkExecutor {
    config: WorkerConfig,
    queue: Arc<WorkQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl WorkExecutor {
    /// Create a new executor.
    pub fn new(config: WorkerConfig, queue: WorkQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run the executor until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let ctx = Arc::new(ProcessingContext::new(self.config.clone()).await?);

        let mut shutdown_rx = self.shutdown.subscribe();

        // Periodically claim items whose worker went quiet past the
        // visibility timeout.
        let claim_task = {
            let queue = Arc::clone(&self.queue);
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&self.job_semaphore);
            let consumer_name = self.consumer_name.clone();
            let claim_interval = self.config.claim_interval;
            let job_timeout = self.config.job_timeout;
            let mut shutdown_rx = self.shutdown.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(claim_interval);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            let slots = semaphore.available_permits().min(5);
                            if slots == 0 {
                                continue;
                            }
                            match queue.claim_stale(&consumer_name, slots).await {
                                Ok(items) if !items.is_empty() => {
                                    info!("Claimed {} stale work items", items.len());
                                    for (message_id, item) in items {
                                        let Ok(permit) =
                                            Arc::clone(&semaphore).acquire_owned().await
                                        else {
                                            return;
                                        };
                                        let ctx = Arc::clone(&ctx);
                                        let queue = Arc::clone(&queue);
                                        tokio::spawn(async move {
                                            let _permit = permit;
                                            execute_work(ctx, queue, job_timeout, message_id, item)
                                                .await;
                                        });
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => warn!("Failed to claim stale work items: {}", e),
                            }
                        }
                    }
                }
            })
        };

        // Main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume(&ctx) => {
                    if let Err(e) = result {
                        error!("Error consuming work items: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Executor stopped");
        Ok(())
    }

    /// Receive and dispatch work items.
    async fn consume(&self, ctx: &Arc<ProcessingContext>) -> WorkerResult<()> {
        if self.job_semaphore.available_permits() == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let items = self
            .queue
            .receive(&self.consumer_name, self.config.poll_block.as_millis() as u64)
            .await?;

        if items.is_empty() {
            return Ok(());
        }

        debug!("Received {} work items", items.len());

        for (message_id, item) in items {
            let ctx = Arc::clone(ctx);
            let queue = Arc::clone(&self.queue);
            let job_timeout = self.config.job_timeout;
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::Io(std::io::Error::other("semaphore closed")))?;

            tokio::spawn(async move {
                let _permit = permit;
                execute_work(ctx, queue, job_timeout, message_id, item).await;
            });
        }

        Ok(())
    }

    /// Wait for all in-flight jobs to finish.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Process one delivery and settle it with the queue and the status store.
async fn execute_work(
    ctx: Arc<ProcessingContext>,
    queue: Arc<WorkQueue>,
    job_timeout: Duration,
    message_id: String,
    item: WorkItem,
) {
    let job_id = item.job_id.clone();
    info!(job_id = %job_id, message_id = %message_id, "Processing work item");

    let result = match tokio::time::timeout(job_timeout, process_work_item(&ctx, &item)).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::DeadlineExceeded(job_timeout.as_secs())),
    };

    match result {
        Ok(()) => {
            if let Err(e) = queue.ack(&message_id).await {
                error!(job_id = %job_id, "Failed to ack work item: {}", e);
            }
        }
        Err(e) => match e.classify() {
            ErrorClass::Permanent(job_error) => {
                error!(
                    job_id = %job_id,
                    code = %job_error.code,
                    "Permanent failure, not retrying: {}", e
                );
                if let Err(store_err) = ctx.store.fail(&job_id, &job_error).await {
                    warn!(job_id = %job_id, "Failed to record job failure: {}", store_err);
                }
                if let Err(ack_err) = queue.ack(&message_id).await {
                    error!(job_id = %job_id, "Failed to ack failed work item: {}", ack_err);
                }
            }
            ErrorClass::Transient => {
                let attempts = queue
                    .increment_receive_count(&message_id)
                    .await
                    .unwrap_or(u32::MAX);
                let max_attempts = queue.max_receive_count();

                if attempts >= max_attempts {
                    warn!(
                        job_id = %job_id,
                        attempts = attempts,
                        "Redelivery budget exhausted, dead-lettering: {}", e
                    );
                    if let Err(dlq_err) = queue.dead_letter(&message_id, &item, &e.to_string()).await
                    {
                        error!(job_id = %job_id, "Failed to dead-letter work item: {}", dlq_err);
                    }
                    let job_error = JobError::new(
                        ERROR_MAX_RETRIES,
                        format!("failed after {} delivery attempts: {}", attempts, e),
                    );
                    if let Err(store_err) = ctx.store.fail(&job_id, &job_error).await {
                        warn!(job_id = %job_id, "Failed to record job failure: {}", store_err);
                    }
                } else {
                    // Left unacked; the queue redelivers after the
                    // visibility timeout.
                    info!(
                        job_id = %job_id,
                        attempt = attempts,
                        max_attempts = max_attempts,
                        "Transient failure, awaiting redelivery: {}", e
                    );
                }
            }
        },
    }
}
