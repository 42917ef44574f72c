//! Media splitting worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vsplit_queue::WorkQueue;
use vsplit_worker::{WorkExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for TLS endpoints)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vsplit=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vsplit-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // Create queue client
    let queue = match WorkQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create work queue: {}", e);
            std::process::exit(1);
        }
    };

    // Create executor
    let executor = Arc::new(WorkExecutor::new(config, queue));

    // Signal handler triggers graceful drain
    let executor_for_signal = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        executor_for_signal.shutdown();
    });

    // Run executor
    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
