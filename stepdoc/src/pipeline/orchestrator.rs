//! Pipeline orchestrator: the per-chapter state machine.
//!
//! Every background commit is guarded on the generation the job captured when
//! it was enqueued. Cancel and reprocess bump the generation, so a stale job
//! that limps to completion afterwards writes nothing; the newer state wins
//! regardless of scheduling order.
//!
//! Job entry points (`run_processing_job`, `stitch_and_publish`) never bubble
//! pipeline-stage errors to the caller: failures are persisted as FAILED
//! chapter state with a diagnostic report, and a failure to persist even that
//! is logged and dropped.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analyzer::VideoAnalyzer;
use crate::compositor::VideoCompositor;
use crate::context::resolve_analysis_context;
use crate::database::models::{
    AuditLogDbModel, ChapterDbModel, ChapterStatus, ProcessingJobDbModel,
};
use crate::database::repositories::{
    ChapterRepository, ConfigurationRepository, ObservabilityRepository,
};
use crate::domain::{FailureReport, StructuredContent};
use crate::pipeline::queue::{JobKind, JobQueue, PipelineJob};
use crate::synthesizer::SpeechSynthesizer;
use crate::{Error, Result};

pub struct PipelineOrchestrator {
    chapters: Arc<dyn ChapterRepository>,
    configuration: Arc<dyn ConfigurationRepository>,
    observability: Arc<dyn ObservabilityRepository>,
    analyzer: Arc<dyn VideoAnalyzer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    compositor: Arc<dyn VideoCompositor>,
    queue: JobQueue,
    shutdown: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(
        chapters: Arc<dyn ChapterRepository>,
        configuration: Arc<dyn ConfigurationRepository>,
        observability: Arc<dyn ObservabilityRepository>,
        analyzer: Arc<dyn VideoAnalyzer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        compositor: Arc<dyn VideoCompositor>,
        queue: JobQueue,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chapters,
            configuration,
            observability,
            analyzer,
            synthesizer,
            compositor,
            queue,
            shutdown,
        }
    }

    /// Full processing run: analysis, per-step narration, DRAFTED commit.
    ///
    /// A vanished chapter or a stale generation is a silent no-op; stage
    /// failures end in persisted FAILED state, not an `Err`.
    pub async fn run_processing_job(
        &self,
        chapter_id: i64,
        generation: i64,
        goal: &str,
    ) -> Result<()> {
        let Some(chapter) = self.chapters.find(chapter_id).await? else {
            warn!(chapter_id, "Chapter vanished before processing started");
            return Ok(());
        };
        if chapter.generation != generation {
            debug!(chapter_id, generation, current = chapter.generation, "Skipping stale job");
            return Ok(());
        }
        if !self
            .chapters
            .set_status_guarded(chapter_id, ChapterStatus::Processing, generation)
            .await?
        {
            debug!(chapter_id, "Chapter moved on before processing started");
            return Ok(());
        }

        info!(chapter_id, generation, "Processing job started");
        let job_id = self.start_job_record(chapter_id).await;

        let row = match self.chapters.get_with_context(chapter_id).await {
            Ok(row) => row,
            Err(err) => {
                self.fail_chapter(chapter_id, generation, "Analysis failed", &err)
                    .await;
                self.finish_job_record(job_id, "failed", Some(&err.to_string()))
                    .await;
                return Ok(());
            }
        };
        let context = resolve_analysis_context(&row, goal);

        if self.shutdown.is_cancelled() {
            warn!(chapter_id, "Shutdown requested, abandoning job before analysis");
            return Ok(());
        }

        let mut content = match self.analyzer.analyze(&row.video_key, &context).await {
            Ok(content) => content,
            Err(err) => {
                self.fail_chapter(chapter_id, generation, "Analysis failed", &err)
                    .await;
                self.finish_job_record(job_id, "failed", Some(&err.to_string()))
                    .await;
                return Ok(());
            }
        };
        info!(chapter_id, title = %content.title, steps = content.steps.len(), "Analysis complete");

        // Narrate sequentially, preserving step order. A step whose narration
        // fails keeps empty audio fields and stays recoverable through the
        // regenerate operation.
        for (index, step) in content.steps.iter_mut().enumerate() {
            if self.shutdown.is_cancelled() {
                warn!(chapter_id, "Shutdown requested, abandoning job mid-narration");
                return Ok(());
            }
            if step.description.trim().is_empty() {
                continue;
            }
            match self.synthesizer.synthesize(&step.description).await {
                Ok(Some(clip)) => {
                    step.audio_url = Some(clip.key);
                    step.duration = Some(clip.duration);
                }
                Ok(None) => {
                    debug!(chapter_id, index, "Step produced no narration");
                }
                Err(err) => {
                    warn!(chapter_id, index, error = %err, "Step narration errored, continuing");
                }
            }
        }

        let json = match content.to_json() {
            Ok(json) => json,
            Err(err) => {
                self.fail_chapter(chapter_id, generation, "Serialization failed", &err)
                    .await;
                self.finish_job_record(job_id, "failed", Some(&err.to_string()))
                    .await;
                return Ok(());
            }
        };

        match self
            .chapters
            .commit_content_guarded(chapter_id, &json, ChapterStatus::Drafted, generation)
            .await
        {
            Ok(true) => {
                info!(chapter_id, "Chapter drafted");
                self.finish_job_record(job_id, "completed", None).await;
            }
            Ok(false) => {
                debug!(chapter_id, "Draft commit lost to a newer generation");
                self.finish_job_record(job_id, "superseded", None).await;
            }
            Err(err) => {
                error!(chapter_id, error = %err, "Failed to commit drafted content");
                self.finish_job_record(job_id, "failed", Some(&err.to_string()))
                    .await;
            }
        }
        Ok(())
    }

    /// Re-narrate one step with replacement text.
    ///
    /// Stored content is only mutated after synthesis succeeded, so every
    /// validation or engine failure leaves the chapter exactly as it was.
    pub async fn regenerate_step_audio(
        &self,
        chapter_id: i64,
        step_index: usize,
        new_text: &str,
    ) -> Result<StructuredContent> {
        let chapter = self.chapters.get(chapter_id).await?;
        let status = status_of(&chapter)?;
        if status.is_busy() {
            return Err(Error::InvalidStateTransition {
                from: status.as_str().to_string(),
                to: ChapterStatus::Drafted.as_str().to_string(),
            });
        }
        if new_text.trim().is_empty() {
            return Err(Error::validation("replacement text must not be empty"));
        }
        let raw = chapter
            .content
            .ok_or_else(|| Error::validation("chapter has no content yet"))?;
        let mut content = StructuredContent::from_json(&raw)
            .map_err(|_| Error::validation("chapter content is not a structured manual"))?;
        let step_count = content.steps.len();
        let step = content.steps.get_mut(step_index).ok_or_else(|| {
            Error::validation(format!(
                "step index {step_index} out of bounds for {step_count} steps"
            ))
        })?;

        let clip = self
            .synthesizer
            .synthesize(new_text)
            .await?
            .ok_or_else(|| Error::remote("no narration could be generated for the step"))?;

        step.description = new_text.to_string();
        step.audio_url = Some(clip.key);
        step.duration = Some(clip.duration);

        self.chapters
            .set_content(chapter_id, &content.to_json()?)
            .await?;
        self.record_audit("REGENERATE_AUDIO", chapter_id).await;
        Ok(content)
    }

    /// Restart processing from scratch. Invalidates any in-flight job via the
    /// generation bump and enqueues a fresh run.
    pub async fn reprocess(&self, chapter_id: i64, goal: &str) -> Result<()> {
        let chapter = self.chapters.get(chapter_id).await?;
        let status = status_of(&chapter)?;
        if status.is_busy() {
            return Err(Error::InvalidStateTransition {
                from: status.as_str().to_string(),
                to: ChapterStatus::Pending.as_str().to_string(),
            });
        }

        let generation = self
            .chapters
            .bump_generation(chapter_id, ChapterStatus::Pending, None)
            .await?;
        if !self.queue.enqueue(PipelineJob {
            chapter_id,
            generation,
            kind: JobKind::Process {
                goal: goal.to_string(),
            },
        }) {
            return Err(Error::Other("pipeline queue is full".to_string()));
        }
        self.record_audit("REPROCESS", chapter_id).await;
        Ok(())
    }

    /// Mark the chapter cancelled. In-flight work is not interrupted; the
    /// generation bump guarantees its eventual commit is discarded.
    pub async fn cancel(&self, chapter_id: i64) -> Result<()> {
        let chapter = self.chapters.get(chapter_id).await?;
        let status = status_of(&chapter)?;
        if status.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: status.as_str().to_string(),
                to: ChapterStatus::Failed.as_str().to_string(),
            });
        }

        let report = FailureReport::new("Cancelled", "processing cancelled by the user");
        self.chapters
            .bump_generation(chapter_id, ChapterStatus::Failed, Some(&report.to_json()))
            .await?;
        self.record_audit("CANCEL", chapter_id).await;
        info!(chapter_id, "Chapter cancelled");
        Ok(())
    }

    /// Publish a drafted chapter. With no intro/outro configured this is a
    /// single synchronous status flip; otherwise the chapter parks in
    /// PUBLISHING while a stitch job runs.
    pub async fn publish(&self, chapter_id: i64) -> Result<()> {
        let chapter = self.chapters.get(chapter_id).await?;
        let status = status_of(&chapter)?;
        if status != ChapterStatus::Drafted {
            return Err(Error::InvalidStateTransition {
                from: status.as_str().to_string(),
                to: ChapterStatus::Completed.as_str().to_string(),
            });
        }

        let config = self.configuration.get_or_create().await?;
        if !config.wants_stitch() {
            if !self
                .chapters
                .set_status_guarded(chapter_id, ChapterStatus::Completed, chapter.generation)
                .await?
            {
                return Err(Error::validation("chapter changed while publishing, retry"));
            }
            self.record_audit("PUBLISH", chapter_id).await;
            info!(chapter_id, "Chapter published without stitching");
            return Ok(());
        }

        if !self
            .chapters
            .set_status_guarded(chapter_id, ChapterStatus::Publishing, chapter.generation)
            .await?
        {
            return Err(Error::validation("chapter changed while publishing, retry"));
        }
        if !self.queue.enqueue(PipelineJob {
            chapter_id,
            generation: chapter.generation,
            kind: JobKind::Stitch,
        }) {
            // Roll the status flip back so the chapter stays editable.
            let _ = self
                .chapters
                .set_status_guarded(chapter_id, ChapterStatus::Drafted, chapter.generation)
                .await;
            return Err(Error::Other("pipeline queue is full".to_string()));
        }
        self.record_audit("PUBLISH", chapter_id).await;
        Ok(())
    }

    /// Background half of a stitched publish.
    ///
    /// The compositor's own copy-mode fallback returns the main key unchanged
    /// and the publish completes with the unstitched video; only errors before
    /// the concat (a lost main video) fail the chapter.
    pub async fn stitch_and_publish(&self, chapter_id: i64, generation: i64) -> Result<()> {
        let Some(chapter) = self.chapters.find(chapter_id).await? else {
            warn!(chapter_id, "Chapter vanished before stitching started");
            return Ok(());
        };
        if chapter.generation != generation {
            debug!(chapter_id, "Skipping stale stitch job");
            return Ok(());
        }

        let config = match self.configuration.get_or_create().await {
            Ok(config) => config,
            Err(err) => {
                self.fail_chapter(chapter_id, generation, "Publish failed", &err)
                    .await;
                return Ok(());
            }
        };

        match self
            .compositor
            .stitch(
                &chapter.video_key,
                config.intro_video_key.as_deref(),
                config.outro_video_key.as_deref(),
            )
            .await
        {
            Ok(key) => {
                let stitched = (key != chapter.video_key).then_some(key.as_str());
                match self
                    .chapters
                    .commit_publish_guarded(chapter_id, &key, stitched, generation)
                    .await
                {
                    Ok(true) => info!(chapter_id, video_key = %key, "Chapter published"),
                    Ok(false) => debug!(chapter_id, "Publish commit lost to a newer generation"),
                    Err(err) => {
                        error!(chapter_id, error = %err, "Failed to commit published state");
                    }
                }
            }
            Err(err) => {
                self.fail_chapter(chapter_id, generation, "Publish failed", &err)
                    .await;
            }
        }
        Ok(())
    }

    /// Best-effort FAILED transition with a diagnostic report. A persistence
    /// failure here has nowhere left to go, so it is logged and dropped.
    async fn fail_chapter(&self, chapter_id: i64, generation: i64, label: &str, err: &Error) {
        let report = FailureReport::new(label, err.to_string());
        match self
            .chapters
            .commit_content_guarded(
                chapter_id,
                &report.to_json(),
                ChapterStatus::Failed,
                generation,
            )
            .await
        {
            Ok(true) => warn!(chapter_id, error = %err, "{label}, chapter marked FAILED"),
            Ok(false) => debug!(chapter_id, "Failure state lost to a newer generation"),
            Err(persist_err) => {
                error!(
                    chapter_id,
                    error = %err,
                    persist_error = %persist_err,
                    "Could not persist failure state"
                );
            }
        }
    }

    async fn start_job_record(&self, chapter_id: i64) -> Option<i64> {
        let job = ProcessingJobDbModel::started(chapter_id, self.analyzer.model_name());
        match self.observability.record_job_started(&job).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(chapter_id, error = %err, "Failed to record processing job");
                None
            }
        }
    }

    async fn finish_job_record(&self, job_id: Option<i64>, status: &str, error: Option<&str>) {
        let Some(job_id) = job_id else { return };
        if let Err(err) = self
            .observability
            .record_job_finished(job_id, status, error)
            .await
        {
            warn!(job_id, error = %err, "Failed to finalize processing job record");
        }
    }

    async fn record_audit(&self, action: &str, chapter_id: i64) {
        let log = AuditLogDbModel::action(action, "Chapter", chapter_id);
        if let Err(err) = self.observability.record_audit(&log).await {
            warn!(action, chapter_id, error = %err, "Failed to record audit log");
        }
    }
}

fn status_of(chapter: &ChapterDbModel) -> Result<ChapterStatus> {
    chapter.status().ok_or_else(|| {
        Error::Database(format!(
            "chapter {} has corrupt status '{}'",
            chapter.id, chapter.status
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sqlx::SqlitePool;
    use tokio::sync::mpsc;

    use super::*;
    use crate::analyzer::MockVideoAnalyzer;
    use crate::compositor::MockVideoCompositor;
    use crate::database::models::{CollectionDbModel, ModuleDbModel, SystemDbModel};
    use crate::database::repositories::{
        AssetKind, HierarchyRepository, SqlxChapterRepository, SqlxConfigurationRepository,
        SqlxHierarchyRepository, SqlxObservabilityRepository,
    };
    use crate::domain::StepRecord;
    use crate::synthesizer::{AudioClip, MockSpeechSynthesizer};

    async fn setup_pool() -> SqlitePool {
        let pool = crate::database::init_pool("sqlite::memory:").await.unwrap();
        crate::database::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seed_chapter(pool: &SqlitePool) -> i64 {
        let hierarchy = SqlxHierarchyRepository::new(pool.clone());
        let system = hierarchy
            .create_system(&SystemDbModel {
                id: 0,
                name: "ERP".to_string(),
                context_prompt: None,
            })
            .await
            .unwrap();
        let module = hierarchy
            .create_module(&ModuleDbModel {
                id: 0,
                system_id: system,
                name: "Cadastro".to_string(),
                context_prompt: None,
            })
            .await
            .unwrap();
        let repo = SqlxChapterRepository::new(pool.clone());
        let (_, chapter_id) = repo
            .create_with_collection(
                &CollectionDbModel::new(module, "Cadastro de Cliente", "auto"),
                &ChapterDbModel::new(0, "Cadastro de Cliente", "videos/v.webm"),
            )
            .await
            .unwrap();
        chapter_id
    }

    fn sample_content() -> StructuredContent {
        StructuredContent {
            title: "Manual".to_string(),
            steps: vec![
                StepRecord {
                    timestamp: "00:05".to_string(),
                    description: "Clicou em 'Novo'".to_string(),
                    audio_url: None,
                    duration: None,
                },
                StepRecord {
                    timestamp: "00:12".to_string(),
                    description: "Clicou em 'Salvar'".to_string(),
                    audio_url: None,
                    duration: None,
                },
            ],
        }
    }

    fn analyzer_returning(content: StructuredContent) -> MockVideoAnalyzer {
        let mut analyzer = MockVideoAnalyzer::new();
        analyzer
            .expect_model_name()
            .return_const("gemini-1.5-pro".to_string());
        analyzer
            .expect_analyze()
            .returning(move |_, _| Ok(content.clone()));
        analyzer
    }

    fn analyzer_failing(message: &str) -> MockVideoAnalyzer {
        let message = message.to_string();
        let mut analyzer = MockVideoAnalyzer::new();
        analyzer
            .expect_model_name()
            .return_const("gemini-1.5-pro".to_string());
        analyzer
            .expect_analyze()
            .returning(move |_, _| Err(Error::remote(message.clone())));
        analyzer
    }

    fn synthesizer_returning_clips() -> MockSpeechSynthesizer {
        let counter = AtomicUsize::new(0);
        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer.expect_synthesize().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(AudioClip {
                key: format!("audio/{n}.mp3"),
                duration: 1.5,
            }))
        });
        synthesizer
    }

    struct Fixture {
        pool: SqlitePool,
        orchestrator: PipelineOrchestrator,
        rx: mpsc::Receiver<PipelineJob>,
    }

    async fn fixture(
        analyzer: MockVideoAnalyzer,
        synthesizer: MockSpeechSynthesizer,
        compositor: MockVideoCompositor,
    ) -> Fixture {
        let pool = setup_pool().await;
        let (queue, rx) = JobQueue::bounded(8);
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(SqlxChapterRepository::new(pool.clone())),
            Arc::new(SqlxConfigurationRepository::new(pool.clone())),
            Arc::new(SqlxObservabilityRepository::new(pool.clone())),
            Arc::new(analyzer),
            Arc::new(synthesizer),
            Arc::new(compositor),
            queue,
            CancellationToken::new(),
        );
        Fixture {
            pool,
            orchestrator,
            rx,
        }
    }

    fn chapters(pool: &SqlitePool) -> SqlxChapterRepository {
        SqlxChapterRepository::new(pool.clone())
    }

    async fn draft_chapter(pool: &SqlitePool, id: i64) {
        let repo = chapters(pool);
        let content = sample_content().to_json().unwrap();
        assert!(
            repo.commit_content_guarded(id, &content, ChapterStatus::Drafted, 0)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn happy_path_drafts_with_audio() {
        let f = fixture(
            analyzer_returning(sample_content()),
            synthesizer_returning_clips(),
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;

        f.orchestrator
            .run_processing_job(id, 0, "cadastrar cliente")
            .await
            .unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "DRAFTED");
        let content = StructuredContent::from_json(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(content.steps.len(), 2);
        assert!(content.steps.iter().all(|s| s.audio_url.is_some()));
        assert_eq!(content.steps[0].duration, Some(1.5));
    }

    #[tokio::test]
    async fn analyzer_error_persists_failure_report() {
        let f = fixture(
            analyzer_failing("vision API returned 500"),
            MockSpeechSynthesizer::new(),
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;

        f.orchestrator.run_processing_job(id, 0, "").await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "FAILED");
        let report: serde_json::Value =
            serde_json::from_str(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(report["error"], "Analysis failed");
        assert!(report["details"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn context_fetch_error_persists_failure_report() {
        let f = fixture(
            analyzer_returning(sample_content()),
            MockSpeechSynthesizer::new(),
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;

        // Break the eager-load join so the context fetch errors after the
        // chapter has already flipped to PROCESSING.
        sqlx::query("ALTER TABLE modules RENAME COLUMN context_prompt TO context_hint")
            .execute(&f.pool)
            .await
            .unwrap();

        f.orchestrator.run_processing_job(id, 0, "").await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "FAILED");
        let report: serde_json::Value =
            serde_json::from_str(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(report["error"], "Analysis failed");
    }

    #[tokio::test]
    async fn step_narration_failure_is_partial_not_fatal() {
        let counter = AtomicUsize::new(0);
        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer.expect_synthesize().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(AudioClip {
                    key: "audio/first.mp3".to_string(),
                    duration: 2.0,
                }))
            } else {
                Ok(None)
            }
        });

        let f = fixture(
            analyzer_returning(sample_content()),
            synthesizer,
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;

        f.orchestrator.run_processing_job(id, 0, "").await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "DRAFTED");
        let content = StructuredContent::from_json(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(content.steps[0].audio_url.as_deref(), Some("audio/first.mp3"));
        assert_eq!(content.steps[1].audio_url, None);
    }

    #[tokio::test]
    async fn cancelled_chapter_ignores_stale_completion() {
        let f = fixture(
            analyzer_returning(sample_content()),
            synthesizer_returning_clips(),
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;

        f.orchestrator.cancel(id).await.unwrap();

        // The job enqueued at creation now runs with the old generation.
        f.orchestrator.run_processing_job(id, 0, "").await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "FAILED");
        let report: serde_json::Value =
            serde_json::from_str(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(report["error"], "Cancelled");
    }

    #[tokio::test]
    async fn cancel_of_terminal_chapter_is_rejected() {
        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;
        f.orchestrator.cancel(id).await.unwrap();

        let result = f.orchestrator.cancel(id).await;
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn reprocess_bumps_generation_and_enqueues_once() {
        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            MockVideoCompositor::new(),
        )
        .await;
        let mut rx = f.rx;
        let id = seed_chapter(&f.pool).await;
        draft_chapter(&f.pool, id).await;

        f.orchestrator.reprocess(id, "de novo").await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "PENDING");
        assert_eq!(chapter.generation, 1);

        let job = rx.try_recv().unwrap();
        assert_eq!(job.chapter_id, id);
        assert_eq!(job.generation, 1);
        assert_eq!(
            job.kind,
            JobKind::Process {
                goal: "de novo".to_string()
            }
        );

        // The chapter already has a job in flight; a second reprocess is
        // rejected instead of queueing a duplicate.
        assert!(f.orchestrator.reprocess(id, "").await.is_err());
    }

    #[tokio::test]
    async fn publish_without_bumpers_completes_directly() {
        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            MockVideoCompositor::new(),
        )
        .await;
        let mut rx = f.rx;
        let id = seed_chapter(&f.pool).await;
        draft_chapter(&f.pool, id).await;

        f.orchestrator.publish(id).await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "COMPLETED");
        assert_eq!(chapter.video_key, "videos/v.webm");
        assert!(chapter.stitched_video_key.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_with_bumpers_runs_stitch_job() {
        let mut compositor = MockVideoCompositor::new();
        compositor
            .expect_stitch()
            .returning(|main, _, _| Ok(format!("stitched/final_{}", main.rsplit('/').next().unwrap())));

        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            compositor,
        )
        .await;
        let mut rx = f.rx;
        let id = seed_chapter(&f.pool).await;
        draft_chapter(&f.pool, id).await;

        let configs = SqlxConfigurationRepository::new(f.pool.clone());
        configs
            .set_asset_key(AssetKind::Intro, "assets/intro.mp4")
            .await
            .unwrap();

        f.orchestrator.publish(id).await.unwrap();
        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "PUBLISHING");

        let job = rx.try_recv().unwrap();
        assert_eq!(job.kind, JobKind::Stitch);

        f.orchestrator
            .stitch_and_publish(job.chapter_id, job.generation)
            .await
            .unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "COMPLETED");
        assert_eq!(chapter.video_key, "stitched/final_v.webm");
        assert_eq!(
            chapter.stitched_video_key.as_deref(),
            Some("stitched/final_v.webm")
        );
    }

    #[tokio::test]
    async fn stitch_copy_fallback_completes_with_original_video() {
        // Compositor's copy-mode fallback hands back the main key unchanged.
        let mut compositor = MockVideoCompositor::new();
        compositor
            .expect_stitch()
            .returning(|main, _, _| Ok(main.to_string()));

        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            compositor,
        )
        .await;
        let id = seed_chapter(&f.pool).await;
        draft_chapter(&f.pool, id).await;

        let configs = SqlxConfigurationRepository::new(f.pool.clone());
        configs
            .set_asset_key(AssetKind::Outro, "assets/outro.mp4")
            .await
            .unwrap();

        f.orchestrator.publish(id).await.unwrap();
        f.orchestrator.stitch_and_publish(id, 0).await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "COMPLETED");
        assert_eq!(chapter.video_key, "videos/v.webm");
        assert!(chapter.stitched_video_key.is_none());
    }

    #[tokio::test]
    async fn stitch_error_fails_chapter() {
        let mut compositor = MockVideoCompositor::new();
        compositor
            .expect_stitch()
            .returning(|_, _, _| Err(Error::media("main video download failed")));

        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            compositor,
        )
        .await;
        let id = seed_chapter(&f.pool).await;
        draft_chapter(&f.pool, id).await;

        let configs = SqlxConfigurationRepository::new(f.pool.clone());
        configs
            .set_asset_key(AssetKind::Intro, "assets/intro.mp4")
            .await
            .unwrap();

        f.orchestrator.publish(id).await.unwrap();
        f.orchestrator.stitch_and_publish(id, 0).await.unwrap();

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        assert_eq!(chapter.status, "FAILED");
        let report: serde_json::Value =
            serde_json::from_str(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(report["error"], "Publish failed");
    }

    #[tokio::test]
    async fn publish_requires_drafted_status() {
        let f = fixture(
            MockVideoAnalyzer::new(),
            MockSpeechSynthesizer::new(),
            MockVideoCompositor::new(),
        )
        .await;
        let id = seed_chapter(&f.pool).await;

        let result = f.orchestrator.publish(id).await;
        assert!(matches!(
            result,
            Err(Error::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn regenerate_validation_taxonomy() {
        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer.expect_synthesize().returning(|_| Ok(None));

        let f = fixture(MockVideoAnalyzer::new(), synthesizer, MockVideoCompositor::new()).await;
        let id = seed_chapter(&f.pool).await;

        // Unknown chapter.
        assert!(matches!(
            f.orchestrator.regenerate_step_audio(999, 0, "texto").await,
            Err(Error::NotFound { .. })
        ));
        // No content yet.
        assert!(matches!(
            f.orchestrator.regenerate_step_audio(id, 0, "texto").await,
            Err(Error::Validation(_))
        ));

        draft_chapter(&f.pool, id).await;

        // Out-of-bounds step.
        assert!(matches!(
            f.orchestrator.regenerate_step_audio(id, 9, "texto").await,
            Err(Error::Validation(_))
        ));
        // Empty replacement text.
        assert!(matches!(
            f.orchestrator.regenerate_step_audio(id, 0, "  ").await,
            Err(Error::Validation(_))
        ));
        // Both engines down surfaces as a remote-service error and the stored
        // content keeps its original description.
        assert!(matches!(
            f.orchestrator.regenerate_step_audio(id, 0, "novo texto").await,
            Err(Error::RemoteService(_))
        ));
        let chapter = chapters(&f.pool).get(id).await.unwrap();
        let content = StructuredContent::from_json(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(content.steps[0].description, "Clicou em 'Novo'");
    }

    #[tokio::test]
    async fn regenerate_success_updates_single_step() {
        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer.expect_synthesize().returning(|_| {
            Ok(Some(AudioClip {
                key: "audio/regen.mp3".to_string(),
                duration: 3.25,
            }))
        });

        let f = fixture(MockVideoAnalyzer::new(), synthesizer, MockVideoCompositor::new()).await;
        let id = seed_chapter(&f.pool).await;
        draft_chapter(&f.pool, id).await;

        let content = f
            .orchestrator
            .regenerate_step_audio(id, 1, "Clicou em 'Confirmar'")
            .await
            .unwrap();

        assert_eq!(content.steps[1].description, "Clicou em 'Confirmar'");
        assert_eq!(content.steps[1].audio_url.as_deref(), Some("audio/regen.mp3"));
        assert_eq!(content.steps[1].duration, Some(3.25));
        // The untouched step keeps its fields.
        assert_eq!(content.steps[0].description, "Clicou em 'Novo'");

        let chapter = chapters(&f.pool).get(id).await.unwrap();
        let stored = StructuredContent::from_json(chapter.content.as_deref().unwrap()).unwrap();
        assert_eq!(stored, content);
    }
}
