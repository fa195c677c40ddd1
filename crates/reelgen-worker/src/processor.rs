//! Generation job orchestration.
//!
//! A job runs its stages strictly in order inside a private working
//! directory: hook resolution, main clip selection, segment trimming,
//! voiceover synthesis, composition, publishing. Each stage boundary is a
//! progress checkpoint. The first error ends the job as failed; nothing is
//! retried.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::Instrument;

use reelgen_media::{compose_with_hook, move_file, trim_segment, CompositionInput, MediaTool};
use reelgen_models::{Checkpoint, GenerationJob, JobId};
use reelgen_store::{ClipCatalog, JobStore, StoreError};

use crate::config::WorkerConfig;
use crate::error::{media_detail, PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::ProgressReporter;
use crate::selector::{required_main_count, sample_clips, ClipSelector, ClipSet};
use crate::voiceover::{SpeechSynthesizer, VoiceoverSynthesizer};

const FINAL_FILE: &str = "final.mp4";

/// Runs generation jobs end to end.
pub struct GenerationPipeline {
    config: Arc<WorkerConfig>,
    store: Arc<dyn JobStore>,
    tool: Arc<dyn MediaTool>,
    selector: ClipSelector,
    voiceover: VoiceoverSynthesizer,
}

async fn timed<T, F>(stage: &'static str, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    metrics::record_stage_duration(stage, start.elapsed().as_secs_f64());
    result
}

impl GenerationPipeline {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: Arc<dyn JobStore>,
        catalog: Arc<dyn ClipCatalog>,
        tool: Arc<dyn MediaTool>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let selector = ClipSelector::new(
            catalog,
            config.media_root.clone(),
            config.hook_category.clone(),
        );
        let voiceover = VoiceoverSynthesizer::new(speech, Arc::clone(&tool));
        Self {
            config,
            store,
            tool,
            selector,
            voiceover,
        }
    }

    /// Run one job to a terminal state.
    ///
    /// Failures are written to the job record before being returned, so
    /// callers that only need the side effect may ignore the result.
    pub async fn run(&self, job_id: &JobId) -> PipelineResult<GenerationJob> {
        let logger = JobLogger::new(job_id, "generate_video");
        let span = logger.create_span();
        self.run_logged(job_id, logger).instrument(span).await
    }

    async fn run_logged(&self, job_id: &JobId, logger: JobLogger) -> PipelineResult<GenerationJob> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| StoreError::not_found(job_id.as_str()))?;

        let reporter = ProgressReporter::new(
            Arc::clone(&self.store),
            job_id.clone(),
            self.config.progress_schedule,
            logger.clone(),
        );

        let started = Instant::now();
        logger.log_start(&format!(
            "categories={:?} total={}s clip={}s hook={}",
            job.categories, job.total_length, job.clip_duration, job.use_hook
        ));

        match self.execute(&job, &reporter).await {
            Ok(done) => {
                metrics::record_job_completed(started.elapsed().as_secs_f64());
                Ok(done)
            }
            Err(e) => {
                reporter.fail(e.kind(), &e.to_string()).await;
                metrics::record_job_failed(e.kind());
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &GenerationJob,
        reporter: &ProgressReporter,
    ) -> PipelineResult<GenerationJob> {
        reporter
            .checkpoint(Checkpoint::Started, "Generation started")
            .await?;

        // Removed on drop, whichever way this function returns
        let work_dir = self.create_work_dir(&job.id).await?;

        let clips = self.select_clips(job, reporter).await?;

        reporter
            .checkpoint(
                Checkpoint::TrimmingSegments,
                &format!("Trimming {} clips", clips.mains.len()),
            )
            .await?;
        let segments = timed("trim", self.trim_all(&clips, job.clip_duration, work_dir.path())).await?;

        reporter
            .checkpoint(Checkpoint::SynthesizingVoice, "Generating voiceover")
            .await?;
        let voiceover = timed(
            "voiceover",
            self.voiceover.synthesize(&job.script, work_dir.path()),
        )
        .await?;
        reporter
            .checkpoint(Checkpoint::VoiceoverReady, "Voiceover ready")
            .await?;

        reporter
            .checkpoint(Checkpoint::Composing, "Composing final video")
            .await?;
        let hook = clips
            .hook
            .as_ref()
            .ok_or(PipelineError::NonHookCompositionUnsupported)?;
        let composed = work_dir.path().join(FINAL_FILE);
        let input = CompositionInput {
            hook: hook.path.clone(),
            segments,
            voiceover,
            output: composed.clone(),
            hook_duration: self.config.hook_duration,
            total_length: job.total_length,
            fallback_frame: self.config.canonical_frame,
        };
        timed("compose", async {
            compose_with_hook(self.tool.as_ref(), &input)
                .await
                .map_err(|e| PipelineError::CompositionFailure(media_detail(&e)))
        })
        .await?;

        reporter
            .checkpoint(Checkpoint::Publishing, "Publishing video")
            .await?;
        let file_name = format!("{}_final.mp4", job.id);
        move_file(&composed, self.config.output_dir.join(&file_name)).await?;

        reporter.complete(&self.config.output_url(&file_name)).await
    }

    async fn create_work_dir(&self, job_id: &JobId) -> PipelineResult<TempDir> {
        let creation_failure = |e: std::io::Error| PipelineError::DirectoryCreationFailure {
            path: self.config.tmp_dir.display().to_string(),
            detail: e.to_string(),
        };

        tokio::fs::create_dir_all(&self.config.tmp_dir)
            .await
            .map_err(creation_failure)?;
        tempfile::Builder::new()
            .prefix(&format!("{job_id}-"))
            .tempdir_in(&self.config.tmp_dir)
            .map_err(creation_failure)
    }

    async fn select_clips(
        &self,
        job: &GenerationJob,
        reporter: &ProgressReporter,
    ) -> PipelineResult<ClipSet> {
        let hook = if job.use_hook {
            reporter
                .checkpoint(Checkpoint::ResolvingHook, "Resolving hook clip")
                .await?;
            Some(self.selector.resolve_hook().await?)
        } else {
            None
        };

        reporter
            .checkpoint(Checkpoint::SelectingClips, "Selecting main clips")
            .await?;
        let required = required_main_count(
            job.total_length,
            job.clip_duration,
            hook.as_ref().map(|_| self.config.hook_duration),
        );
        let pool = self.selector.valid_pool(&job.categories).await?;
        let mains = sample_clips(pool, required, &mut rand::rng())?;

        Ok(ClipSet { hook, mains })
    }

    async fn trim_all(
        &self,
        clips: &ClipSet,
        clip_duration: f64,
        work_dir: &Path,
    ) -> PipelineResult<Vec<PathBuf>> {
        let mut segments = Vec::with_capacity(clips.mains.len());
        for (index, clip) in clips.mains.iter().enumerate() {
            let output = work_dir.join(format!("trimmed-{index}.mp4"));
            trim_segment(self.tool.as_ref(), &clip.path, &output, clip_duration)
                .await
                .map_err(|e| PipelineError::TranscodeFailure {
                    index,
                    detail: media_detail(&e),
                })?;
            segments.push(output);
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use reelgen_media::testing::FakeMediaTool;
    use reelgen_models::{JobStatus, JobUpdate, NewJob};
    use reelgen_store::{InMemoryClipCatalog, InMemoryJobStore, StoreResult};
    use std::sync::Mutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::voiceover::{ElevenLabsClient, VoiceoverConfig};

    /// Job store that remembers every record it hands back from `update`.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryJobStore,
        writes: Mutex<Vec<GenerationJob>>,
    }

    impl RecordingStore {
        fn writes_for(&self, id: &JobId) -> Vec<(JobStatus, u8)> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|j| &j.id == id)
                .map(|j| (j.status, j.progress))
                .collect()
        }
    }

    #[async_trait]
    impl JobStore for RecordingStore {
        async fn create(&self, job: NewJob) -> StoreResult<GenerationJob> {
            self.inner.create(job).await
        }

        async fn get(&self, id: &JobId) -> StoreResult<Option<GenerationJob>> {
            self.inner.get(id).await
        }

        async fn update(&self, id: &JobId, update: JobUpdate) -> StoreResult<GenerationJob> {
            let job = self.inner.update(id, update).await?;
            self.writes.lock().unwrap().push(job.clone());
            Ok(job)
        }

        async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<GenerationJob>> {
            self.inner.list_by_status(status).await
        }
    }

    struct FixedSpeech;

    #[async_trait]
    impl SpeechSynthesizer for FixedSpeech {
        async fn synthesize(&self, _text: &str) -> PipelineResult<Vec<u8>> {
            Ok(b"mp3".to_vec())
        }
    }

    struct Harness {
        root: TempDir,
        store: Arc<RecordingStore>,
        catalog: Arc<InMemoryClipCatalog>,
        tool: Arc<FakeMediaTool>,
    }

    impl Harness {
        async fn new(tool: FakeMediaTool) -> Self {
            let root = TempDir::new().unwrap();
            tokio::fs::create_dir_all(root.path().join("uploads"))
                .await
                .unwrap();
            Self {
                root,
                store: Arc::new(RecordingStore::default()),
                catalog: Arc::new(InMemoryClipCatalog::new()),
                tool: Arc::new(tool),
            }
        }

        async fn add_clips(&self, category: &str, count: usize) {
            for i in 0..count {
                let name = format!("{category}-{i}.mp4");
                tokio::fs::write(self.root.path().join("uploads").join(&name), b"mp4")
                    .await
                    .unwrap();
                self.catalog
                    .add(&name, category, format!("/uploads/{name}"), "6.00s", Utc::now())
                    .await;
            }
        }

        fn config(&self) -> WorkerConfig {
            WorkerConfig {
                media_root: self.root.path().to_path_buf(),
                output_dir: self.root.path().join("public/videos"),
                tmp_dir: self.root.path().join("tmp"),
                ..WorkerConfig::default()
            }
        }

        fn pipeline(&self, speech: Arc<dyn SpeechSynthesizer>) -> GenerationPipeline {
            GenerationPipeline::new(
                Arc::new(self.config()),
                self.store.clone(),
                self.catalog.clone(),
                self.tool.clone(),
                speech,
            )
        }

        async fn create_job(&self, categories: &[&str], use_hook: bool) -> JobId {
            self.store
                .create(NewJob {
                    categories: categories.iter().map(|c| c.to_string()).collect(),
                    script: "Small steps every day.".into(),
                    use_hook,
                    total_length: 65.0,
                    clip_duration: 5.0,
                })
                .await
                .unwrap()
                .id
        }

        fn work_dirs_left(&self) -> usize {
            std::fs::read_dir(self.root.path().join("tmp"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }

        fn published(&self) -> Vec<String> {
            std::fs::read_dir(self.root.path().join("public/videos"))
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    fn assert_monotonic(writes: &[(JobStatus, u8)]) {
        let processing: Vec<u8> = writes
            .iter()
            .filter(|(s, _)| *s == JobStatus::Processing)
            .map(|(_, p)| *p)
            .collect();
        assert!(
            processing.windows(2).all(|w| w[0] <= w[1]),
            "progress went backwards: {processing:?}"
        );
    }

    #[tokio::test]
    async fn test_hook_job_completes() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 20).await;
        let id = harness.create_job(&["gym"], true).await;

        let job = harness.pipeline(Arc::new(FixedSpeech)).run(&id).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        let expected_url = format!("/videos/{id}_final.mp4");
        assert_eq!(job.output_url.as_deref(), Some(expected_url.as_str()));
        assert!(job.error.is_none());
        assert_eq!(harness.published(), vec![format!("{id}_final.mp4")]);

        // 13 trims, one voiceover transcode, one composition
        let commands = harness.tool.commands();
        assert_eq!(commands.len(), 15);
        let trims: Vec<_> = commands
            .iter()
            .filter(|c| c.output().to_string_lossy().contains("trimmed-"))
            .collect();
        assert_eq!(trims.len(), 13);
        let composition = commands.last().unwrap();
        assert_eq!(composition.inputs().len(), 15);

        let writes = harness.store.writes_for(&id);
        assert_monotonic(&writes);
        let checkpoints: Vec<u8> = writes.iter().map(|(_, p)| *p).collect();
        assert_eq!(checkpoints, vec![0, 10, 15, 25, 40, 60, 80, 90, 100]);
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_missing_hook_fails_job() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("gym", 20).await;
        let id = harness.create_job(&["gym"], true).await;

        let err = harness
            .pipeline(Arc::new(FixedSpeech))
            .run(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::HookResolutionFailure { .. }));

        let job = harness.store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.error.unwrap().contains("hook"));
        assert!(job.output_url.is_none());
        assert!(harness.tool.commands().is_empty());
        assert!(harness.published().is_empty());
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_speech_api_failure_fails_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
            .mount(&server)
            .await;
        let mut voice = VoiceoverConfig::new("key");
        voice.base_url = server.uri();
        let speech = Arc::new(ElevenLabsClient::new(voice).unwrap());

        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 13).await;
        let id = harness.create_job(&["gym"], true).await;

        harness.pipeline(speech).run(&id).await.unwrap_err();

        let job = harness.store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.error.unwrap().contains("quota exceeded"));
        assert!(job.output_url.is_none());
        assert!(harness.published().is_empty());
        assert_monotonic(&harness.store.writes_for(&id));
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_clips() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 12).await;
        let id = harness.create_job(&["gym"], true).await;

        let err = harness
            .pipeline(Arc::new(FixedSpeech))
            .run(&id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientClips {
                required: 13,
                available: 12
            }
        ));
        let job = harness.store.get(&id).await.unwrap().unwrap();
        assert_eq!(
            job.error.as_deref(),
            Some("Not enough clips available. Required 13 clips, but only found 12.")
        );
    }

    #[tokio::test]
    async fn test_without_hook_fails_at_composition() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("gym", 13).await;
        let id = harness.create_job(&["gym"], false).await;

        let err = harness
            .pipeline(Arc::new(FixedSpeech))
            .run(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NonHookCompositionUnsupported));

        // 65 / 5 without the hook offset
        let trims = harness
            .tool
            .outputs()
            .iter()
            .filter(|p| p.to_string_lossy().contains("trimmed-"))
            .count();
        assert_eq!(trims, 13);
        assert!(harness.published().is_empty());
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_trim_failure_reports_index() {
        let harness = Harness::new(FakeMediaTool::new().fail_on("trimmed-0")).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 13).await;
        let id = harness.create_job(&["gym"], true).await;

        let err = harness
            .pipeline(Arc::new(FixedSpeech))
            .run(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TranscodeFailure { index: 0, .. }));

        let job = harness.store.get(&id).await.unwrap().unwrap();
        assert!(job.error.unwrap().contains("Invalid data found"));
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_composition_failure_fails_job() {
        let harness = Harness::new(FakeMediaTool::new().fail_on("final")).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 13).await;
        let id = harness.create_job(&["gym"], true).await;

        let err = harness
            .pipeline(Arc::new(FixedSpeech))
            .run(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CompositionFailure(_)));

        let job = harness.store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.error.is_some());
        assert!(job.output_url.is_none());
        assert!(harness.published().is_empty());
        assert_monotonic(&harness.store.writes_for(&id));
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_unusable_tmp_dir_fails_job() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 13).await;
        let id = harness.create_job(&["gym"], true).await;

        // A regular file where a parent directory is expected
        let blocker = harness.root.path().join("blocker");
        tokio::fs::write(&blocker, b"not a directory").await.unwrap();
        let config = WorkerConfig {
            tmp_dir: blocker.join("tmp"),
            ..harness.config()
        };
        let pipeline = GenerationPipeline::new(
            Arc::new(config),
            harness.store.clone(),
            harness.catalog.clone(),
            harness.tool.clone(),
            Arc::new(FixedSpeech),
        );

        let err = pipeline.run(&id).await.unwrap_err();
        assert!(matches!(err, PipelineError::DirectoryCreationFailure { .. }));

        let job = harness.store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0);
        assert!(job.output_url.is_none());
        assert!(harness.tool.commands().is_empty());
        assert!(harness.published().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_independent() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        harness.add_clips("hooks", 1).await;
        harness.add_clips("gym", 13).await;
        harness.add_clips("cars", 13).await;
        let gym = harness.create_job(&["gym"], true).await;
        let cars = harness.create_job(&["cars"], true).await;

        let pipeline = harness.pipeline(Arc::new(FixedSpeech));
        let (a, b) = tokio::join!(pipeline.run(&gym), pipeline.run(&cars));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.status, JobStatus::Completed);
        assert_eq!(b.status, JobStatus::Completed);
        assert_ne!(a.output_url, b.output_url);
        assert_monotonic(&harness.store.writes_for(&gym));
        assert_monotonic(&harness.store.writes_for(&cars));

        // Each job trimmed only its own category
        for command in harness.tool.commands() {
            let output = command.output().to_string_lossy().to_string();
            if !output.contains("trimmed-") {
                continue;
            }
            let source = command.inputs()[0].to_string_lossy().to_string();
            if output.contains(gym.as_str()) {
                assert!(source.contains("gym-"), "{source}");
            } else {
                assert!(source.contains("cars-"), "{source}");
            }
        }
        assert_eq!(harness.published().len(), 2);
        assert_eq!(harness.work_dirs_left(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let harness = Harness::new(FakeMediaTool::new()).await;
        let err = harness
            .pipeline(Arc::new(FixedSpeech))
            .run(&JobId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Store(ref e) if e.is_not_found()));
    }
}
