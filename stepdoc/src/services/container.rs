//! Service container: builds and owns every long-lived component.
//!
//! Construction order matters: database pool and migrations first, then the
//! artifact store, then the media services, then the queue and worker pool.
//! Shutdown runs in reverse.

use std::sync::Arc;

use tracing::info;

use crate::analyzer::GeminiAnalyzer;
use crate::api::server::AppState;
use crate::compositor::FfmpegCompositor;
use crate::config::AppConfig;
use crate::database::repositories::{
    SqlxChapterRepository, SqlxConfigurationRepository, SqlxHierarchyRepository,
    SqlxObservabilityRepository,
};
use crate::database::{self, DbPool};
use crate::error::Result;
use crate::pipeline::{JobQueue, PipelineOrchestrator, WorkerPool, WorkerPoolConfig};
use crate::storage::{ArtifactStore, ObjectStoreArtifactStore};
use crate::synthesizer::SpeechService;

/// Pending jobs the queue holds before upload handlers start shedding.
const JOB_QUEUE_CAPACITY: usize = 64;

/// Owns the database pool, the worker pool and the shared application state.
pub struct ServiceContainer {
    pool: DbPool,
    worker_pool: WorkerPool,
    state: AppState,
}

impl ServiceContainer {
    /// Build every service from the application config and start the worker
    /// pool.
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;

        let chapters = Arc::new(SqlxChapterRepository::new(pool.clone()));
        let hierarchy = Arc::new(SqlxHierarchyRepository::new(pool.clone()));
        let configuration = Arc::new(SqlxConfigurationRepository::new(pool.clone()));
        let observability = Arc::new(SqlxObservabilityRepository::new(pool.clone()));

        let store: Arc<dyn ArtifactStore> =
            Arc::new(ObjectStoreArtifactStore::from_config(&config.storage)?);

        let analyzer = Arc::new(GeminiAnalyzer::new(
            config.analyzer.clone(),
            store.clone(),
            config.work_dir.clone(),
        )?);
        let synthesizer = Arc::new(SpeechService::new(
            config.synthesizer.clone(),
            store.clone(),
            config.work_dir.clone(),
        )?);
        let compositor = Arc::new(FfmpegCompositor::new(store.clone(), config.work_dir.clone()));

        let (queue, rx) = JobQueue::bounded(JOB_QUEUE_CAPACITY);
        let worker_pool = WorkerPool::new(WorkerPoolConfig::default());

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            chapters.clone(),
            configuration.clone(),
            observability.clone(),
            analyzer,
            synthesizer,
            compositor,
            queue.clone(),
            worker_pool.cancellation_token(),
        ));
        worker_pool.start(rx, orchestrator.clone(), queue.in_flight());

        let state = AppState {
            start_time: std::time::Instant::now(),
            chapters,
            hierarchy,
            configuration,
            observability,
            store,
            orchestrator,
            queue,
        };

        info!("Service container initialized");
        Ok(Self {
            pool,
            worker_pool,
            state,
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Stop the worker pool and close the database pool. In-flight jobs see
    /// the cancellation token and bail at the next stage boundary.
    pub async fn shutdown(&self) {
        self.worker_pool.stop().await;
        self.pool.close().await;
        info!("Service container shut down");
    }
}
