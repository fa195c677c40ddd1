//! Axum HTTP API server.
//!
//! This crate provides:
//! - Generate and status-polling endpoints for narrated video jobs
//! - Static serving of finished videos and source clips
//! - Rate limiting and security headers
//! - Prometheus metrics
//! - The stale job detector

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{StaleJobConfig, StaleJobDetector};
pub use state::AppState;
