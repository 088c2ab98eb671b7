//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart frame upload and video download (`/api/convert`)
//! - Progress polling for the most recent conversion
//! - Health, readiness and Prometheus metrics endpoints
//! - Per-IP rate limiting and security headers

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
