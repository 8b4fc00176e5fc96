//! Bounded pipeline job queue.
//!
//! Jobs are fire-and-forget: HTTP handlers enqueue and return immediately,
//! the worker pool drains. The in-flight set enforces at most one concurrent
//! job per chapter; a second submission for the same chapter is dropped, not
//! queued behind the first, because the first job's result would make the
//! second stale anyway.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// What a queued job should do.
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Full analysis + synthesis run.
    Process { goal: String },
    /// Publish-time stitch of intro/outro bumpers.
    Stitch,
}

/// One unit of background work.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub chapter_id: i64,
    /// Chapter generation captured at enqueue time; all of the job's
    /// status/content commits are guarded on it.
    pub generation: i64,
    pub kind: JobKind,
}

/// Chapters with a job queued or running.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<i64>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot for the chapter. False when one is already held.
    pub fn try_claim(&self, chapter_id: i64) -> bool {
        self.inner.lock().insert(chapter_id)
    }

    pub fn release(&self, chapter_id: i64) {
        self.inner.lock().remove(&chapter_id);
    }

    pub fn contains(&self, chapter_id: i64) -> bool {
        self.inner.lock().contains(&chapter_id)
    }
}

/// Producer half handed to the orchestrator and HTTP handlers.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<PipelineJob>,
    in_flight: InFlightSet,
}

impl JobQueue {
    /// Create the queue; the receiver goes to the worker pool.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<PipelineJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                in_flight: InFlightSet::new(),
            },
            rx,
        )
    }

    pub fn in_flight(&self) -> InFlightSet {
        self.in_flight.clone()
    }

    /// Submit a job. Returns false (and logs) when the chapter already has a
    /// job in flight or the queue is full; the caller decides whether that is
    /// an error.
    pub fn enqueue(&self, job: PipelineJob) -> bool {
        let chapter_id = job.chapter_id;
        if !self.in_flight.try_claim(chapter_id) {
            warn!(chapter_id, "Dropping job submission, chapter already has a job in flight");
            return false;
        }
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(err) => {
                self.in_flight.release(chapter_id);
                warn!(chapter_id, error = %err, "Dropping job submission, pipeline queue is full");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_submission_for_same_chapter_is_dropped() {
        let (queue, mut rx) = JobQueue::bounded(8);
        let job = PipelineJob {
            chapter_id: 7,
            generation: 0,
            kind: JobKind::Process {
                goal: String::new(),
            },
        };
        assert!(queue.enqueue(job.clone()));
        assert!(!queue.enqueue(job.clone()));

        // Once the first finishes, the chapter can be queued again.
        let received = rx.recv().await.unwrap();
        queue.in_flight().release(received.chapter_id);
        assert!(queue.enqueue(job));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_leaking_claims() {
        let (queue, _rx) = JobQueue::bounded(1);
        assert!(queue.enqueue(PipelineJob {
            chapter_id: 1,
            generation: 0,
            kind: JobKind::Stitch,
        }));
        assert!(!queue.enqueue(PipelineJob {
            chapter_id: 2,
            generation: 0,
            kind: JobKind::Stitch,
        }));
        // The rejected chapter must not be stuck in the in-flight set.
        assert!(!queue.in_flight().contains(2));
    }

    #[tokio::test]
    async fn distinct_chapters_interleave() {
        let (queue, mut rx) = JobQueue::bounded(8);
        for id in 1..=3 {
            assert!(queue.enqueue(PipelineJob {
                chapter_id: id,
                generation: 0,
                kind: JobKind::Stitch,
            }));
        }
        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap().chapter_id, expected);
        }
    }
}
