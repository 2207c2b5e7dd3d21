//! Bounded worker pool for detail fetches
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - Per-task retry loops driven by the retry policy
//! - Reporting every task's terminal outcome through a result channel
//!
//! Workers never touch the crawl state; the coordinator drains the channel and
//! is the only one that merges results.

use crate::crawler::detail::DetailFetcher;
use crate::crawler::fetcher::IdentityPool;
use crate::crawler::parser::{DetailOutcome, SkipReason};
use crate::crawler::retry::{ErrorKind, RetryDecision, RetryPolicy};
use crate::state::Record;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// One identifier on its way through the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub id: String,

    /// Attempts made so far
    pub attempts: u32,
}

impl FetchTask {
    pub fn new(id: String) -> Self {
        Self { id, attempts: 0 }
    }
}

/// Terminal outcome of a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The item produced a record
    Record(Record),

    /// The item has nothing usable
    Skipped(SkipReason),

    /// Retries ran out; carries the last error
    Abandoned(String),

    /// The crawl was cancelled before the task finished
    Cancelled,
}

/// What a worker sends back for each task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub id: String,
    pub attempts: u32,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    fn new(task: FetchTask, outcome: TaskOutcome) -> Self {
        Self {
            id: task.id,
            attempts: task.attempts,
            outcome,
        }
    }
}

/// Drives one task to a terminal outcome
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | Record | Done |
/// | Skip | Done, never retried |
/// | Parse error | Logged, reported as a `Malformed` skip |
/// | Transient / rate limited | Sleep per policy, retry until `max_attempts` |
/// | Cancellation | Stop before the next attempt or during a backoff sleep |
pub async fn run_task<D: DetailFetcher>(
    fetcher: &D,
    policy: &RetryPolicy,
    identities: &IdentityPool,
    mut task: FetchTask,
    cancel: &CancellationToken,
) -> TaskReport {
    loop {
        if cancel.is_cancelled() {
            return TaskReport::new(task, TaskOutcome::Cancelled);
        }

        task.attempts += 1;
        let error = match fetcher.fetch(&task.id, identities.pick()).await {
            Ok(DetailOutcome::Record(record)) => {
                return TaskReport::new(task, TaskOutcome::Record(record))
            }
            Ok(DetailOutcome::Skip(reason)) => {
                tracing::debug!("Skipping {}: {}", task.id, reason.as_str());
                return TaskReport::new(task, TaskOutcome::Skipped(reason));
            }
            Err(error) => error,
        };

        let kind = error.kind().unwrap_or(ErrorKind::Transient);
        if kind == ErrorKind::Parse {
            tracing::warn!("{}", error);
            return TaskReport::new(task, TaskOutcome::Skipped(SkipReason::Malformed));
        }

        match policy.next_delay(task.attempts, kind) {
            RetryDecision::Abort => {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    task.id,
                    task.attempts,
                    error
                );
                return TaskReport::new(task, TaskOutcome::Abandoned(error.to_string()));
            }
            RetryDecision::Retry(delay) => {
                tracing::debug!(
                    "{} (attempt {}/{}), retrying in {:?}",
                    error,
                    task.attempts,
                    policy.max_attempts(),
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return TaskReport::new(task, TaskOutcome::Cancelled);
                    }
                }
            }
        }
    }
}

/// Pool of at most `size` concurrent detail fetches
pub struct WorkerPool<D> {
    semaphore: Arc<Semaphore>,
    fetcher: Arc<D>,
    policy: RetryPolicy,
    identities: Arc<IdentityPool>,
    cancel: CancellationToken,
    size: usize,
}

impl<D: DetailFetcher> WorkerPool<D> {
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `size` - Maximum number of tasks fetching at once
    /// * `fetcher` - Detail fetcher shared by all workers
    /// * `policy` - Retry policy applied inside each task
    /// * `identities` - User-Agent values rotated per attempt
    /// * `cancel` - Token that stops queued tasks and backoff sleeps
    pub fn new(
        size: usize,
        fetcher: Arc<D>,
        policy: RetryPolicy,
        identities: IdentityPool,
        cancel: CancellationToken,
    ) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            fetcher,
            policy,
            identities: Arc::new(identities),
            cancel,
            size,
        }
    }

    /// Submits a batch of tasks
    ///
    /// Every submitted task sends exactly one report; the channel closes once
    /// all of them have finished. Reports arrive in completion order.
    pub fn dispatch(&self, tasks: Vec<FetchTask>) -> mpsc::Receiver<TaskReport> {
        let (tx, rx) = mpsc::channel(tasks.len().max(1));

        for task in tasks {
            let tx = tx.clone();
            let semaphore = self.semaphore.clone();
            let fetcher = self.fetcher.clone();
            let identities = self.identities.clone();
            let cancel = self.cancel.clone();
            let policy = self.policy;

            tokio::spawn(async move {
                let report = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(_permit) => {
                            run_task(fetcher.as_ref(), &policy, &identities, task, &cancel).await
                        }
                        Err(_) => TaskReport::new(task, TaskOutcome::Cancelled),
                    },
                    _ = cancel.cancelled() => TaskReport::new(task, TaskOutcome::Cancelled),
                };

                // The receiver only goes away if the coordinator stopped listening
                let _ = tx.send(report).await;
            });
        }

        rx
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
