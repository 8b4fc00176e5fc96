//! Asynchronous processing pipeline: queue, worker pool, orchestrator.

pub mod orchestrator;
pub mod queue;
pub mod worker;

pub use orchestrator::PipelineOrchestrator;
pub use queue::{InFlightSet, JobKind, JobQueue, PipelineJob};
pub use worker::{WorkerPool, WorkerPoolConfig};
