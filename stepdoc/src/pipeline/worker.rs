//! Worker pool draining the pipeline job queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::orchestrator::PipelineOrchestrator;
use super::queue::{InFlightSet, JobKind, PipelineJob};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent jobs.
    pub max_workers: usize,
    /// Job timeout in seconds. Analysis of a long video can take minutes;
    /// a job exceeding this is abandoned and its chapter stays PROCESSING
    /// until a reprocess or cancel moves it on.
    pub job_timeout_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            job_timeout_secs: 3600,
        }
    }
}

/// Pool of background workers executing pipeline jobs.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_workers)),
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Token shared with the orchestrator so it can stop between stages.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Start draining the queue.
    pub fn start(
        &self,
        mut rx: mpsc::Receiver<PipelineJob>,
        orchestrator: Arc<PipelineOrchestrator>,
        in_flight: InFlightSet,
    ) {
        let semaphore = self.semaphore.clone();
        let token = self.cancellation_token.clone();
        let job_timeout = Duration::from_secs(self.config.job_timeout_secs);

        info!(max_workers = self.config.max_workers, "Starting pipeline worker pool");

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            join_set.spawn(async move {
                let mut workers: JoinSet<()> = JoinSet::new();
                loop {
                    let job = tokio::select! {
                        _ = token.cancelled() => break,
                        maybe = rx.recv() => match maybe {
                            Some(job) => job,
                            None => break,
                        },
                    };

                    let permit = tokio::select! {
                        _ = token.cancelled() => {
                            in_flight.release(job.chapter_id);
                            break;
                        }
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let orchestrator = orchestrator.clone();
                    let in_flight = in_flight.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        let chapter_id = job.chapter_id;
                        debug!(chapter_id, generation = job.generation, "Worker picked up job");

                        let run = dispatch(&orchestrator, job);
                        match tokio::time::timeout(job_timeout, run).await {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                error!(chapter_id, error = %err, "Pipeline job failed");
                            }
                            Err(_) => {
                                error!(chapter_id, "Pipeline job timed out");
                            }
                        }
                        in_flight.release(chapter_id);
                    });

                    // Reap finished workers as we go.
                    while workers.try_join_next().is_some() {}
                }
                while workers.join_next().await.is_some() {}
            });
        }
    }

    /// Stop accepting jobs and wait for running workers to finish.
    pub async fn stop(&self) {
        info!("Stopping pipeline worker pool");
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };
        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }
        info!("Pipeline worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

async fn dispatch(orchestrator: &PipelineOrchestrator, job: PipelineJob) -> crate::Result<()> {
    match job.kind {
        JobKind::Process { goal } => {
            orchestrator
                .run_processing_job(job.chapter_id, job.generation, &goal)
                .await
        }
        JobKind::Stitch => {
            orchestrator
                .stitch_and_publish(job.chapter_id, job.generation)
                .await
        }
    }
}
