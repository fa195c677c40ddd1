//! Background services.

pub mod stale_job_detector;

pub use stale_job_detector::{StaleJobConfig, StaleJobDetector};
