//! Background service for detecting and failing stalled jobs.
//!
//! A processing job whose record has not been written for longer than the
//! stale timeout is marked failed, so pollers stop waiting on a job whose
//! task died or hung.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use reelgen_models::{GenerationJob, JobStatus, JobUpdate};
use reelgen_store::{JobStore, StoreError};

use crate::metrics;

/// Stale job detector settings.
#[derive(Debug, Clone)]
pub struct StaleJobConfig {
    pub enabled: bool,
    /// Interval between detection runs
    pub check_interval: Duration,
    /// Processing jobs idle longer than this are failed
    pub timeout: Duration,
}

impl Default for StaleJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(1800),
        }
    }
}

impl StaleJobConfig {
    /// Read the detector settings, rejecting zero durations.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let config = Self {
            enabled: std::env::var("ENABLE_STALE_DETECTION")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.enabled),
            check_interval: secs("STALE_CHECK_INTERVAL_SECS", defaults.check_interval),
            timeout: secs("STALE_JOB_TIMEOUT_SECS", defaults.timeout),
        };
        config.validate()?;
        Ok(config)
    }

    /// `tokio::time::interval` panics on a zero period.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval.is_zero() {
            anyhow::bail!("STALE_CHECK_INTERVAL_SECS must be at least 1");
        }
        if self.timeout.is_zero() {
            anyhow::bail!("STALE_JOB_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

/// Stale job detector service.
pub struct StaleJobDetector {
    store: Arc<dyn JobStore>,
    config: StaleJobConfig,
}

impl StaleJobDetector {
    pub fn new(store: Arc<dyn JobStore>, config: StaleJobConfig) -> Self {
        Self { store, config }
    }

    /// Start the background detection loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Stale job detection is disabled");
            return;
        }
        if let Err(e) = self.config.validate() {
            error!("Stale job detector not started: {}", e);
            return;
        }

        info!(
            "Starting stale job detector (interval: {:?}, timeout: {:?})",
            self.config.check_interval, self.config.timeout
        );

        let mut ticker = interval(self.config.check_interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.check_once().await {
                error!("Stale job detection error: {}", e);
            }
        }
    }

    fn is_stale(&self, job: &GenerationJob) -> bool {
        let idle = chrono::Utc::now() - job.updated_at;
        idle.to_std().map(|idle| idle > self.config.timeout).unwrap_or(false)
    }

    /// Run a single detection cycle, returning `(stale, recovered)` counts.
    pub async fn check_once(&self) -> anyhow::Result<(u32, u32)> {
        let processing = self.store.list_by_status(JobStatus::Processing).await?;

        let mut stale_count = 0u32;
        let mut recovered_count = 0u32;

        for job in processing.iter().filter(|j| self.is_stale(j)) {
            stale_count += 1;
            warn!(
                job_id = %job.id,
                progress = job.progress,
                updated_at = %job.updated_at,
                "Detected stalled job"
            );

            match self.recover(job).await {
                Ok(true) => recovered_count += 1,
                Ok(false) => {}
                Err(e) => error!(job_id = %job.id, "Failed to recover stalled job: {}", e),
            }
        }

        if stale_count > 0 {
            metrics::record_stale_jobs_recovered(u64::from(recovered_count));
            info!(
                "Stale job detection complete: {} stale, {} recovered",
                stale_count, recovered_count
            );
        }

        Ok((stale_count, recovered_count))
    }

    /// Fail a stalled job. `Ok(false)` if it finished in the meantime.
    async fn recover(&self, job: &GenerationJob) -> anyhow::Result<bool> {
        let message = format!(
            "Generation stalled: no progress for over {} seconds. Please try again.",
            self.config.timeout.as_secs()
        );

        match self.store.update(&job.id, JobUpdate::failed(message)).await {
            Ok(_) => {
                info!(job_id = %job.id, "Marked stalled job as failed");
                Ok(true)
            }
            Err(StoreError::TerminalState { status, .. }) => {
                info!(job_id = %job.id, status = %status, "Stalled job finished before recovery");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
