//! Axum HTTP API server.
//!
//! This crate provides:
//! - The Submission Gateway (POST /jobs)
//! - The Status Query Endpoint (GET /jobs/{job_id})
//! - The Output Broker (GET /jobs/{job_id}/outputs/{filename})
//! - Health/readiness probes and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
