//! Pipeline metrics.

use metrics::{counter, gauge, histogram};

pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "reelgen_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reelgen_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "reelgen_job_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "reelgen_stage_duration_seconds";
    pub const JOBS_RUNNING: &str = "reelgen_jobs_running";
    pub const JOBS_WAITING: &str = "reelgen_jobs_waiting";
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
}

/// Record a failed job, labelled by the error kind.
pub fn record_job_failed(kind: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind).increment(1);
}

pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

pub fn set_jobs_running(count: usize) {
    gauge!(names::JOBS_RUNNING).set(count as f64);
}

pub fn set_jobs_waiting(count: usize) {
    gauge!(names::JOBS_WAITING).set(count as f64);
}
