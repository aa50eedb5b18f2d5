//! Generation queue: dedup, FIFO admission, bounded concurrency.
//!
//! A word id is either pending, active, or absent; `submit` is a no-op for
//! ids already pending or active. Admitted jobs run as tokio tasks. When one
//! finishes the queue waits out a short cooldown before draining again.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::model::{EntryId, QueueJob};
use crate::telemetry::metrics;

/// Configuration for the generation queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Ceiling on simultaneously active jobs.
    pub max_concurrent: usize,
    /// Pause after a job completes before admitting more work.
    pub cooldown: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            cooldown: Duration::from_millis(100),
        }
    }
}

/// Work executed once per admitted job. Must absorb its own failures.
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, word_id: EntryId);
}

/// Read-only snapshot of queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub active: usize,
    pub total: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueJob>,
    active: HashSet<EntryId>,
    /// Active ids to enqueue again once their current run finishes.
    rerun: HashSet<EntryId>,
}

impl QueueState {
    fn contains(&self, id: EntryId) -> bool {
        self.active.contains(&id) || self.pending.iter().any(|job| job.word_id == id)
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }
}

struct Inner {
    state: Mutex<QueueState>,
    processor: Arc<dyn JobProcessor>,
    config: QueueConfig,
    idle: Notify,
}

/// Cloneable handle; all clones share one queue.
#[derive(Clone)]
pub struct GenerationQueue {
    inner: Arc<Inner>,
}

impl GenerationQueue {
    pub fn new(processor: Arc<dyn JobProcessor>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                processor,
                config: QueueConfig {
                    max_concurrent: config.max_concurrent.max(1),
                    ..config
                },
                idle: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue `word_id` unless it is already pending or active.
    ///
    /// Returns whether a job was added. Must be called from within a tokio
    /// runtime; admitted jobs are spawned onto it.
    pub fn submit(&self, word_id: EntryId) -> bool {
        let pending = {
            let mut state = self.lock();
            if state.contains(word_id) {
                None
            } else {
                state.pending.push_back(QueueJob::new(word_id));
                Some(state.pending.len())
            }
        };

        let Some(pending) = pending else {
            debug!(word_id = %word_id, "already queued or running, ignoring");
            metrics::queue_submissions().add(1, &[KeyValue::new("result", "duplicate")]);
            return false;
        };

        info!(word_id = %word_id, pending, "added to generation queue");
        metrics::queue_submissions().add(1, &[KeyValue::new("result", "admitted")]);
        self.drain();
        true
    }

    /// Make sure `word_id` runs after any result already written.
    ///
    /// Like [`submit`](Self::submit), except that an id which is already
    /// running is queued again when that run finishes instead of being
    /// ignored. An id still pending is left alone. Returns whether a new
    /// run was scheduled.
    pub fn rerun_when_done(&self, word_id: EntryId) -> bool {
        {
            let mut state = self.lock();
            if state.active.contains(&word_id) {
                let fresh = state.rerun.insert(word_id);
                if fresh {
                    info!(word_id = %word_id, "rerun requested for running job");
                }
                return fresh;
            }
        }
        self.submit(word_id)
    }

    /// Admit pending jobs, oldest first, until the ceiling is reached.
    fn drain(&self) {
        loop {
            let (job, active, pending) = {
                let mut state = self.lock();
                if state.active.len() >= self.inner.config.max_concurrent {
                    return;
                }
                let Some(job) = state.pending.pop_front() else {
                    return;
                };
                state.active.insert(job.word_id);
                (job, state.active.len(), state.pending.len())
            };

            let waited_ms = (chrono::Utc::now() - job.enqueued_at).num_milliseconds();
            info!(word_id = %job.word_id, active, pending, waited_ms, "starting generation");

            let queue = self.clone();
            tokio::spawn(async move {
                let processor = Arc::clone(&queue.inner.processor);
                let id = job.word_id;
                // Run in its own task so a panic still releases the slot.
                if let Err(e) = tokio::spawn(async move { processor.process(id).await }).await {
                    error!(word_id = %id, error = %e, "generation job aborted");
                }
                queue.finish(id);
                tokio::time::sleep(queue.inner.config.cooldown).await;
                queue.drain();
            });
        }
    }

    fn finish(&self, word_id: EntryId) {
        let idle = {
            let mut state = self.lock();
            state.active.remove(&word_id);
            if state.rerun.remove(&word_id) {
                state.pending.push_back(QueueJob::new(word_id));
            }
            state.is_idle()
        };
        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        QueueStatus {
            pending: state.pending.len(),
            active: state.active.len(),
            total: state.pending.len() + state.active.len(),
        }
    }

    /// Resolve once nothing is pending or active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }
}
