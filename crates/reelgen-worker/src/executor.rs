//! Job executor.
//!
//! Admission is decided before a job record exists: the API takes an
//! [`Admission`] ticket first and only creates the job once it holds one.
//! Admitted jobs wait on a semaphore for a worker slot and stay `pending`
//! until they get it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reelgen_models::JobId;

use crate::config::{Backpressure, ExecutorConfig};
use crate::metrics;
use crate::processor::GenerationPipeline;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Generation capacity exhausted ({admitted} jobs admitted), try again later")]
    Saturated { admitted: usize },

    #[error("Server is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicUsize,
    running: AtomicUsize,
}

impl Counters {
    fn publish(&self) {
        let admitted = self.admitted.load(Ordering::SeqCst);
        let running = self.running.load(Ordering::SeqCst);
        metrics::set_jobs_running(running);
        metrics::set_jobs_waiting(admitted.saturating_sub(running));
    }
}

/// Reservation for one job. Releases its slot when dropped.
#[derive(Debug)]
pub struct Admission {
    counters: Arc<Counters>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.counters.admitted.fetch_sub(1, Ordering::SeqCst);
        self.counters.publish();
    }
}

struct Running(Arc<Counters>);

impl Running {
    fn start(counters: &Arc<Counters>) -> Self {
        counters.running.fetch_add(1, Ordering::SeqCst);
        counters.publish();
        Self(Arc::clone(counters))
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
        self.0.publish();
    }
}

/// Runs admitted jobs as background tasks.
pub struct JobExecutor {
    pipeline: Arc<GenerationPipeline>,
    config: ExecutorConfig,
    /// `None` when concurrency is unbounded
    slots: Option<Arc<Semaphore>>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl JobExecutor {
    pub fn new(pipeline: Arc<GenerationPipeline>, config: ExecutorConfig) -> Self {
        let slots = match config.max_concurrent_jobs {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        info!(
            max_concurrent = config.max_concurrent_jobs,
            backpressure = ?config.backpressure,
            max_queued = config.max_queued,
            "Job executor ready"
        );
        Self {
            pipeline,
            config,
            slots,
            counters: Arc::new(Counters::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Most jobs that may be admitted at once, `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match (self.config.max_concurrent_jobs, self.config.backpressure) {
            (0, _) => None,
            (n, Backpressure::Reject) => Some(n),
            (n, Backpressure::Queue) => Some(n + self.config.max_queued),
        }
    }

    /// Reserve a slot for a new job.
    pub fn try_admit(&self) -> Result<Admission, AdmissionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdmissionError::ShuttingDown);
        }

        let capacity = self.capacity();
        self.counters
            .admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match capacity {
                Some(limit) if n >= limit => None,
                _ => Some(n + 1),
            })
            .map_err(|admitted| {
                warn!(admitted, "Rejecting generation request, executor saturated");
                AdmissionError::Saturated { admitted }
            })?;

        self.counters.publish();
        Ok(Admission {
            counters: Arc::clone(&self.counters),
        })
    }

    /// Run an admitted job in the background.
    pub fn spawn(&self, admission: Admission, job_id: JobId) -> JoinHandle<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let slots = self.slots.clone();
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let _admission = admission;

            let _permit = match slots {
                Some(slots) => match slots.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        warn!(job_id = %job_id, "Worker slots closed, job not started");
                        return;
                    }
                },
                None => None,
            };

            let _running = Running::start(&counters);
            debug!(job_id = %job_id, "Job acquired a worker slot");
            // Failures are already persisted on the job
            let _ = pipeline.run(&job_id).await;
        })
    }

    /// Jobs admitted and not yet finished, waiting ones included.
    pub fn admitted(&self) -> usize {
        self.counters.admitted.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Stop admitting jobs and wait for admitted ones to finish.
    ///
    /// Returns `false` if jobs were still in flight when the shutdown
    /// timeout expired.
    pub async fn shutdown(&self) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        info!(in_flight = self.admitted(), "Waiting for in-flight jobs to complete...");

        let drained = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_ok();
        if drained {
            info!("Job executor stopped");
        } else {
            warn!(in_flight = self.admitted(), "Shutdown timeout reached with jobs in flight");
        }
        drained
    }

    async fn wait_for_jobs(&self) {
        while self.admitted() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use reelgen_media::testing::FakeMediaTool;
    use reelgen_models::{GenerationJob, JobStatus, NewJob};
    use reelgen_store::{InMemoryClipCatalog, InMemoryJobStore, JobStore};
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    use crate::config::WorkerConfig;
    use crate::error::PipelineResult;
    use crate::voiceover::SpeechSynthesizer;

    /// Speech fake that blocks until the test hands out permits.
    struct GatedSpeech(Arc<Semaphore>);

    #[async_trait]
    impl SpeechSynthesizer for GatedSpeech {
        async fn synthesize(&self, _text: &str) -> PipelineResult<Vec<u8>> {
            let permit = self.0.acquire().await.map_err(|e| {
                crate::error::PipelineError::VoiceoverApiFailure {
                    status: None,
                    detail: e.to_string(),
                }
            })?;
            permit.forget();
            Ok(b"mp3".to_vec())
        }
    }

    struct Setup {
        _root: TempDir,
        store: Arc<InMemoryJobStore>,
        gate: Arc<Semaphore>,
        pipeline: Arc<GenerationPipeline>,
    }

    async fn setup() -> Setup {
        let root = TempDir::new().unwrap();
        let uploads = root.path().join("uploads");
        tokio::fs::create_dir_all(&uploads).await.unwrap();

        let catalog = Arc::new(InMemoryClipCatalog::new());
        for (name, category) in [("hook.mp4", "hooks"), ("a.mp4", "gym"), ("b.mp4", "gym")] {
            tokio::fs::write(uploads.join(name), b"mp4").await.unwrap();
            catalog
                .add(name, category, format!("/uploads/{name}"), "5.00s", Utc::now())
                .await;
        }

        let config = WorkerConfig {
            media_root: root.path().to_path_buf(),
            output_dir: root.path().join("public/videos"),
            tmp_dir: root.path().join("tmp"),
            ..WorkerConfig::default()
        };
        let store = Arc::new(InMemoryJobStore::new());
        let gate = Arc::new(Semaphore::new(0));
        let pipeline = Arc::new(GenerationPipeline::new(
            Arc::new(config),
            store.clone(),
            catalog,
            Arc::new(FakeMediaTool::new()),
            Arc::new(GatedSpeech(gate.clone())),
        ));

        Setup {
            _root: root,
            store,
            gate,
            pipeline,
        }
    }

    fn executor(setup: &Setup, max: usize, backpressure: Backpressure, queued: usize) -> JobExecutor {
        JobExecutor::new(
            setup.pipeline.clone(),
            ExecutorConfig {
                max_concurrent_jobs: max,
                backpressure,
                max_queued: queued,
                shutdown_timeout: Duration::from_secs(5),
            },
        )
    }

    async fn create_job(store: &InMemoryJobStore) -> GenerationJob {
        store
            .create(NewJob {
                categories: vec!["gym".into()],
                script: "Go.".into(),
                use_hook: true,
                total_length: 14.0,
                clip_duration: 5.0,
            })
            .await
            .unwrap()
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_reject_policy_admits_up_to_limit() {
        let setup = setup().await;
        let executor = executor(&setup, 2, Backpressure::Reject, 10);

        let first = executor.try_admit().unwrap();
        let _second = executor.try_admit().unwrap();
        assert_eq!(
            executor.try_admit().unwrap_err(),
            AdmissionError::Saturated { admitted: 2 }
        );

        drop(first);
        assert_ok!(executor.try_admit());
    }

    #[tokio::test]
    async fn test_queue_policy_adds_wait_list() {
        let setup = setup().await;
        let executor = executor(&setup, 1, Backpressure::Queue, 2);
        assert_eq!(executor.capacity(), Some(3));

        let tickets: Vec<_> = (0..3).map(|_| executor.try_admit().unwrap()).collect();
        assert!(matches!(
            executor.try_admit(),
            Err(AdmissionError::Saturated { .. })
        ));
        drop(tickets);
        assert_eq!(executor.admitted(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_always_admits() {
        let setup = setup().await;
        let executor = executor(&setup, 0, Backpressure::Reject, 0);
        assert_eq!(executor.capacity(), None);
        let tickets: Vec<_> = (0..100).map(|_| executor.try_admit().unwrap()).collect();
        assert_eq!(executor.admitted(), 100);
        drop(tickets);
    }

    #[tokio::test]
    async fn test_waiting_job_stays_pending() {
        let setup = setup().await;
        let executor = executor(&setup, 1, Backpressure::Queue, 4);

        let first = create_job(&setup.store).await;
        let second = create_job(&setup.store).await;
        executor.spawn(executor.try_admit().unwrap(), first.id.clone());
        executor.spawn(executor.try_admit().unwrap(), second.id.clone());

        // The first job blocks inside voiceover synthesis
        wait_until(|| executor.running() == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = setup.store.get(&second.id).await.unwrap().unwrap();
        assert_eq!(waiting.status, JobStatus::Pending);
        assert_eq!(executor.admitted(), 2);

        setup.gate.add_permits(2);
        assert!(executor.shutdown().await);

        for id in [&first.id, &second.id] {
            let job = setup.store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_jobs() {
        let setup = setup().await;
        let executor = executor(&setup, 1, Backpressure::Queue, 1);
        assert!(executor.shutdown().await);
        assert_eq!(
            executor.try_admit().unwrap_err(),
            AdmissionError::ShuttingDown
        );
    }
}
