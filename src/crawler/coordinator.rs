//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Restoring state from a checkpoint or a seed table
//! - Fetching listing pages serially and dispatching detail batches
//! - Merging worker results as the single owner of the crawl state
//! - Checkpointing, snapshot exports, and the consecutive-failure cooldown
//! - Handling cancellation and producing the final summary

use crate::config::Config;
use crate::crawler::detail::{DetailFetcher, HttpDetailFetcher};
use crate::crawler::fetcher::{build_http_client, FetchError, IdentityPool};
use crate::crawler::listing::{HttpListFetcher, ListFetcher, ListPage};
use crate::crawler::parser::MoviePageParser;
use crate::crawler::retry::{ErrorKind, RetryDecision, RetryPolicy};
use crate::crawler::scheduler::{FetchTask, TaskOutcome, WorkerPool};
use crate::output::{export_records, load_seed, snapshot_path, CrawlSummary, StopReason};
use crate::state::{CrawlPhase, CrawlState, Cursor, Deduplicator, MergeOutcome};
use crate::storage::{CheckpointStore, JsonCheckpointStore};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Coordinator wired to the HTTP listing and detail fetchers
pub type HttpCoordinator = Coordinator<HttpListFetcher, HttpDetailFetcher<MoviePageParser>>;

/// Result of trying to fetch one listing page
enum PageFetch {
    Page(ListPage),
    Exhausted,
    /// Retries ran out; the round counts as failed
    Failed,
    Cancelled,
}

/// What a drained batch amounted to
#[derive(Debug, Default)]
struct BatchOutcome {
    abandoned: usize,
    cancelled: bool,
}

/// Main crawler coordinator structure
pub struct Coordinator<L, D> {
    config: Arc<Config>,
    lister: L,
    pool: WorkerPool<D>,
    policy: RetryPolicy,
    store: Box<dyn CheckpointStore>,
    state: CrawlState,
    phase: CrawlPhase,
    cancel: CancellationToken,

    skipped: usize,
    abandoned: Vec<String>,
    pages_fetched: usize,
    saved_len: usize,
    snapshot_bucket: usize,
}

impl<L: ListFetcher, D: DetailFetcher> Coordinator<L, D> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `lister` - Source of identifier pages
    /// * `detail` - Detail fetcher shared by the worker pool
    /// * `store` - Checkpoint backend
    /// * `config_hash` - Hash of the configuration file, compared with the checkpoint's
    /// * `fresh` - Ignore any existing checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - The checkpoint or seed table could not be read
    pub fn new(
        config: Config,
        lister: L,
        detail: Arc<D>,
        store: Box<dyn CheckpointStore>,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self> {
        let state = restore_state(&config, store.as_ref(), config_hash, fresh)?;

        let policy = RetryPolicy::new(&config.retry);
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(
            config.crawler.workers as usize,
            detail,
            policy,
            IdentityPool::new(config.source.user_agents.clone()),
            cancel.clone(),
        );

        let saved_len = if fresh { 0 } else { state.len() };
        let snapshot_bucket = match config.output.snapshot_every {
            Some(every) => state.len() / every,
            None => 0,
        };

        Ok(Self {
            config: Arc::new(config),
            lister,
            pool,
            policy,
            store,
            state,
            phase: CrawlPhase::FetchList,
            cancel,
            skipped: 0,
            abandoned: Vec::new(),
            pages_fetched: 0,
            saved_len,
            snapshot_bucket,
        })
    }

    /// Token that stops the crawl when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Runs the main crawl loop
    ///
    /// This method:
    /// 1. Checks that the listing endpoint is reachable
    /// 2. Fetches the listing page at the cursor, retrying per policy
    /// 3. Dispatches the page's new identifiers to the worker pool
    /// 4. Merges the batch's records and advances the cursor
    /// 5. Persists checkpoints and snapshots on their cadence
    ///
    /// Per-item and per-page failures never end the run. The returned error
    /// is reserved for an unreachable endpoint and a failing final save.
    pub async fn run(&mut self) -> Result<CrawlSummary> {
        self.lister.preflight().await?;

        tracing::info!(
            "Starting crawl: {}/{} collected, offset {}, {} workers",
            self.state.len(),
            self.state.target(),
            self.state.cursor.offset,
            self.pool.size()
        );

        let mut streak = 0u32;
        let stop_reason = loop {
            self.phase = CrawlPhase::FetchList;
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if self.state.is_complete() {
                tracing::info!("Target of {} records reached", self.state.target());
                break StopReason::TargetReached;
            }

            let page = match self.fetch_page().await {
                PageFetch::Page(page) => page,
                PageFetch::Exhausted => {
                    tracing::info!(
                        "Listing exhausted at offset {}",
                        self.state.cursor.offset
                    );
                    break StopReason::SourceExhausted;
                }
                PageFetch::Cancelled => break StopReason::Cancelled,
                PageFetch::Failed => {
                    streak = self.record_failed_round(streak).await;
                    self.pause_between_pages().await;
                    continue;
                }
            };
            self.pages_fetched += 1;

            self.phase = CrawlPhase::Dispatch;
            let (tasks, next) = self.plan_batch(&page);
            let batch_size = tasks.len();
            tracing::debug!(
                "Page at offset {}: {} listed, {} dispatched",
                self.state.cursor.offset,
                page.ids.len(),
                batch_size
            );

            self.phase = CrawlPhase::Collect;
            let batch = self.collect(tasks).await;
            if batch.cancelled {
                break StopReason::Cancelled;
            }
            self.state.cursor = next;

            self.phase = CrawlPhase::Persist;
            self.persist_progress();

            if batch_size > 0 && batch.abandoned == batch_size {
                streak = self.record_failed_round(streak).await;
            } else {
                streak = 0;
            }

            tracing::info!(
                "Progress: {}/{} collected, offset {}, {} skipped, {} abandoned",
                self.state.len(),
                self.state.target(),
                self.state.cursor.offset,
                self.skipped,
                self.abandoned.len()
            );

            if !self.state.is_complete() {
                self.pause_between_pages().await;
            }
        };

        self.phase = match stop_reason {
            StopReason::Cancelled => CrawlPhase::Aborted,
            _ => CrawlPhase::Done,
        };
        debug_assert!(self.phase.is_terminal());
        self.finish()?;

        tracing::info!(
            "Crawl {}: {}/{} collected ({})",
            self.phase,
            self.state.len(),
            self.state.target(),
            stop_reason
        );

        Ok(CrawlSummary {
            collected: self.state.len(),
            target: self.state.target(),
            skipped: self.skipped,
            abandoned: self.abandoned.clone(),
            pages_fetched: self.pages_fetched,
            stop_reason,
            phase: self.phase,
        })
    }

    /// Fetches the page at the cursor, retrying per policy
    async fn fetch_page(&self) -> PageFetch {
        let cursor = self.state.cursor;
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return PageFetch::Cancelled;
            }

            attempts += 1;
            let error = match self.lister.fetch(&cursor).await {
                Ok(page) => return PageFetch::Page(page),
                Err(FetchError::Exhausted) => return PageFetch::Exhausted,
                Err(error) => error,
            };

            let kind = error.kind().unwrap_or(ErrorKind::Transient);
            match self.policy.next_delay(attempts, kind) {
                RetryDecision::Abort => {
                    tracing::warn!(
                        "Listing page at offset {} failed after {} attempts: {}",
                        cursor.offset,
                        attempts,
                        error
                    );
                    return PageFetch::Failed;
                }
                RetryDecision::Retry(delay) => {
                    tracing::debug!("{}, retrying in {:?}", error, delay);
                    if !self.sleep(delay).await {
                        return PageFetch::Cancelled;
                    }
                }
            }
        }
    }

    /// Selects the tasks for a page and the cursor that follows them
    ///
    /// Identifiers already collected or repeated within the page are dropped.
    /// When the remaining capacity runs out, the returned cursor stops at the
    /// first identifier left undispatched so it is listed again. The offset is
    /// taken from the raw page, which still counts entries the fetcher dropped.
    fn plan_batch(&self, page: &ListPage) -> (Vec<FetchTask>, Cursor) {
        let capacity = self.state.remaining();
        let mut in_page = Deduplicator::new();
        let mut tasks = Vec::new();

        for (index, id) in page.ids.iter().enumerate() {
            if !self.state.is_new(id) || !in_page.check_and_mark(id) {
                continue;
            }
            if tasks.len() >= capacity {
                return (tasks, self.state.cursor.advance(page.position(index)));
            }
            tasks.push(FetchTask::new(id.clone()));
        }

        (tasks, page.next)
    }

    /// Dispatches a batch and merges its reports until the channel closes
    async fn collect(&mut self, tasks: Vec<FetchTask>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if tasks.is_empty() {
            return outcome;
        }

        let mut reports = self.pool.dispatch(tasks);
        while let Some(report) = reports.recv().await {
            match report.outcome {
                TaskOutcome::Record(record) => match self.state.merge(record) {
                    MergeOutcome::Added => {}
                    MergeOutcome::Duplicate => {
                        tracing::debug!("Duplicate record for {}", report.id)
                    }
                    MergeOutcome::AtCapacity => {
                        tracing::debug!("Target reached, dropping {}", report.id)
                    }
                },
                TaskOutcome::Skipped(_) => self.skipped += 1,
                TaskOutcome::Abandoned(_) => {
                    outcome.abandoned += 1;
                    self.abandoned.push(report.id);
                }
                TaskOutcome::Cancelled => outcome.cancelled = true,
            }
        }

        outcome
    }

    /// Saves a checkpoint and writes a snapshot when their cadences are crossed
    ///
    /// Failures here are logged and retried at the next opportunity.
    fn persist_progress(&mut self) {
        let len = self.state.len();

        if len >= self.saved_len + self.config.output.checkpoint_every {
            match self.store.save(&self.state) {
                Ok(()) => self.saved_len = len,
                Err(e) => tracing::warn!("Failed to save checkpoint: {}", e),
            }
        }

        if let Some(every) = self.config.output.snapshot_every {
            let bucket = len / every;
            if bucket > self.snapshot_bucket {
                let path = snapshot_path(Path::new(&self.config.output.export_path), len);
                match export_records(&path, self.state.collected()) {
                    Ok(()) => {
                        tracing::info!("Snapshot of {} records written to {}", len, path.display());
                        self.snapshot_bucket = bucket;
                    }
                    Err(e) => tracing::warn!("Failed to write snapshot {}: {}", path.display(), e),
                }
            }
        }
    }

    /// Extends the failure streak and cools down when it reaches the threshold
    async fn record_failed_round(&self, streak: u32) -> u32 {
        let streak = streak + 1;
        match self.policy.global_cooldown(streak) {
            Some(cooldown) => {
                tracing::warn!(
                    "{} consecutive failed rounds, cooling down for {:?}",
                    streak,
                    cooldown
                );
                self.sleep(cooldown).await;
                0
            }
            None => streak,
        }
    }

    async fn pause_between_pages(&self) {
        let crawler = &self.config.crawler;
        let millis = fastrand::u64(crawler.list_delay_min_ms..=crawler.list_delay_max_ms);
        self.sleep(Duration::from_millis(millis)).await;
    }

    /// Sleeps for `duration` unless cancelled first; returns false if cancelled
    async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// Final checkpoint and full export
    fn finish(&mut self) -> Result<()> {
        self.store.save(&self.state)?;
        self.saved_len = self.state.len();

        let export_path = Path::new(&self.config.output.export_path);
        match export_records(export_path, self.state.collected()) {
            Ok(()) => tracing::info!(
                "Exported {} records to {}",
                self.state.len(),
                export_path.display()
            ),
            Err(e) => tracing::error!("Failed to export {}: {}", export_path.display(), e),
        }

        Ok(())
    }
}

impl HttpCoordinator {
    /// Builds a coordinator with the HTTP fetchers and the JSON checkpoint store
    pub fn from_config(config: Config, config_hash: &str, fresh: bool) -> Result<Self> {
        let client = build_http_client(&config.crawler)?;
        let lister = HttpListFetcher::new(client.clone(), config.source.clone());
        let detail = Arc::new(HttpDetailFetcher::new(client, MoviePageParser::new()));
        let store = Box::new(JsonCheckpointStore::new(
            &config.output.checkpoint_path,
            config_hash,
        ));

        Self::new(config, lister, detail, store, config_hash, fresh)
    }
}

/// Picks the starting state: checkpoint, then seed table, then empty
fn restore_state(
    config: &Config,
    store: &dyn CheckpointStore,
    config_hash: &str,
    fresh: bool,
) -> Result<CrawlState> {
    let target = config.crawler.target;
    let page_size = config.crawler.page_size;

    if !fresh {
        if let Some(checkpoint) = store.load()? {
            if !checkpoint.config_hash.is_empty() && checkpoint.config_hash != config_hash {
                tracing::warn!("Configuration changed since the checkpoint was written");
            }
            tracing::info!(
                "Resuming from checkpoint: {} records, offset {}",
                checkpoint.collected.len(),
                checkpoint.cursor.offset
            );
            return Ok(checkpoint.into_state(target, page_size));
        }
    }

    if let Some(seed_path) = config.output.seed_path.as_deref() {
        let seed_path = Path::new(seed_path);
        if seed_path.exists() {
            let mut seen = Deduplicator::new();
            let records: Vec<_> = load_seed(seed_path)?
                .into_iter()
                .filter(|record| seen.check_and_mark(&record.id))
                .take(target)
                .collect();
            tracing::info!(
                "Seeded {} records from {}",
                records.len(),
                seed_path.display()
            );
            return Ok(CrawlState::from_records(
                records,
                Cursor::start(page_size),
                target,
            ));
        }
        tracing::debug!("Seed table {} not found", seed_path.display());
    }

    Ok(CrawlState::new(target, page_size))
}

/// Runs a complete crawl against the configured HTTP endpoints
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `fresh` - Ignore any existing checkpoint
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl finished or was cancelled
/// * `Err(CrawlError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use reel_harvest::config::load_config_with_hash;
/// use reel_harvest::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_crawl(config, &hash, false).await?;
/// println!("{}/{}", summary.collected, summary.target);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: &str, fresh: bool) -> Result<CrawlSummary> {
    let mut coordinator = HttpCoordinator::from_config(config, config_hash, fresh)?;
    coordinator.run().await
}
