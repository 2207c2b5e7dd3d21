//! Integration tests for the crawl loop
//!
//! These tests drive the coordinator with in-memory listing and detail
//! fetchers, so every scenario is deterministic and needs no network.

use reel_harvest::config::{Config, CrawlerConfig, OutputConfig, RetryConfig, SourceConfig};
use reel_harvest::crawler::{
    Coordinator, DetailFetcher, DetailOutcome, FetchError, ListFetcher, ListPage, SkipReason,
};
use reel_harvest::output::{export_records, StopReason};
use reel_harvest::state::{CrawlPhase, CrawlState, Cursor, Record};
use reel_harvest::storage::{Checkpoint, CheckpointStore, JsonCheckpointStore, StorageResult};
use reel_harvest::CrawlError;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn id(name: &str) -> String {
    format!("https://movie.example.com/subject/{}/", name)
}

fn record(id: &str) -> Record {
    Record {
        title: format!("Title of {}", id),
        year: 1999,
        director: "Someone".to_string(),
        genres: "剧情".to_string(),
        country: "美国".to_string(),
        language: "英语".to_string(),
        rating: 8.0,
        votes: 42,
        id: id.to_string(),
    }
}

/// Creates a test configuration writing into `dir`
fn create_test_config(dir: &Path, target: usize, workers: u32, page_size: u32) -> Config {
    Config {
        crawler: CrawlerConfig {
            target,
            workers,
            page_size,
            list_delay_min_ms: 0,
            list_delay_max_ms: 0,
            request_timeout_secs: 1,
        },
        source: SourceConfig {
            list_url: "http://127.0.0.1:9/j/search".to_string(),
            sort: "rating".to_string(),
            range: "0,10".to_string(),
            tags: String::new(),
            user_agents: vec!["TestBot/1.0".to_string()],
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            rate_limit_cooldown_ms: 1,
            max_consecutive_failures: 3,
            global_cooldown_ms: 10,
        },
        output: OutputConfig {
            checkpoint_path: dir.join("checkpoint.json").to_string_lossy().into_owned(),
            export_path: dir.join("movies.csv").to_string_lossy().into_owned(),
            checkpoint_every: 5,
            snapshot_every: None,
            seed_path: None,
        },
    }
}

/// Listing over a fixed sequence of identifiers
struct MockLister {
    ids: Vec<String>,
    failures: Mutex<u32>,
    calls: Arc<AtomicUsize>,
    unreachable: bool,
}

impl MockLister {
    fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            failures: Mutex::new(0),
            calls: Arc::new(AtomicUsize::new(0)),
            unreachable: false,
        }
    }

    fn failing_first(mut self, failures: u32) -> Self {
        self.failures = Mutex::new(failures);
        self
    }
}

impl ListFetcher for MockLister {
    async fn fetch(&self, cursor: &Cursor) -> Result<ListPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(FetchError::Transient {
                    url: "list".to_string(),
                    reason: "HTTP 502".to_string(),
                });
            }
        }

        let start = cursor.offset as usize;
        if start >= self.ids.len() {
            return Err(FetchError::Exhausted);
        }
        let end = (start + cursor.page_size as usize).min(self.ids.len());

        Ok(ListPage::contiguous(
            self.ids[start..end].to_vec(),
            cursor.advance(end - start),
        ))
    }

    async fn preflight(&self) -> Result<(), CrawlError> {
        if self.unreachable {
            return Err(CrawlError::Unreachable {
                url: "list".to_string(),
                message: "Connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    NoRating,
    FailTimes(u32),
    AlwaysFail,
}

/// Detail fetcher with scripted per-id behavior; unscripted ids succeed
#[derive(Default)]
struct MockDetail {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, u32>>,
    total: AtomicUsize,
    cancel_after: Mutex<Option<(CancellationToken, usize)>>,
}

impl MockDetail {
    fn with(mut self, id: String, behavior: Behavior) -> Self {
        self.behaviors.insert(id, behavior);
        self
    }

    fn cancel_after(&self, token: CancellationToken, calls: usize) {
        *self.cancel_after.lock().unwrap() = Some((token, calls));
    }

    fn calls(&self, id: &str) -> u32 {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

impl DetailFetcher for MockDetail {
    async fn fetch(&self, id: &str, _identity: &str) -> Result<DetailOutcome, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let guard = self.cancel_after.lock().unwrap();
            if let Some((token, after)) = guard.as_ref() {
                if total >= *after {
                    token.cancel();
                }
            }
        }

        tokio::task::yield_now().await;

        let timeout = || FetchError::Transient {
            url: id.to_string(),
            reason: "Request timeout".to_string(),
        };
        match self.behaviors.get(id).copied() {
            None => Ok(DetailOutcome::Record(record(id))),
            Some(Behavior::NoRating) => Ok(DetailOutcome::Skip(SkipReason::MissingRating)),
            Some(Behavior::FailTimes(n)) if call <= n => Err(timeout()),
            Some(Behavior::FailTimes(_)) => Ok(DetailOutcome::Record(record(id))),
            Some(Behavior::AlwaysFail) => Err(timeout()),
        }
    }
}

/// Checkpoint store that remembers the size of every save
struct RecordingStore {
    inner: JsonCheckpointStore,
    lengths: Arc<Mutex<Vec<usize>>>,
}

impl CheckpointStore for RecordingStore {
    fn save(&self, state: &CrawlState) -> StorageResult<()> {
        self.lengths.lock().unwrap().push(state.len());
        self.inner.save(state)
    }

    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        self.inner.load()
    }
}

fn coordinator(
    config: Config,
    lister: MockLister,
    detail: Arc<MockDetail>,
    fresh: bool,
) -> Coordinator<MockLister, MockDetail> {
    let store = Box::new(JsonCheckpointStore::new(
        &config.output.checkpoint_path,
        "test-hash",
    ));
    Coordinator::new(config, lister, detail, store, "test-hash", fresh)
        .expect("Failed to create coordinator")
}

fn collected_ids(state: &CrawlState) -> BTreeSet<String> {
    state.collected().iter().map(|r| r.id.clone()).collect()
}

/// 500 unique identifiers with 50 of them listed a second time
fn listing_with_duplicates() -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..500 {
        ids.push(id(&i.to_string()));
        if i % 10 == 9 {
            ids.push(id(&(i - 5).to_string()));
        }
    }
    ids
}

#[tokio::test]
async fn test_duplicates_across_pages_are_fetched_once() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3, 2, 2);
    let export_path = config.output.export_path.clone();

    let lister = MockLister::new(vec![id("a"), id("b"), id("b"), id("c")]);
    let detail = Arc::new(MockDetail::default());

    let mut coordinator = coordinator(config, lister, detail.clone(), true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    assert_eq!(summary.collected, 3);

    let expected: BTreeSet<_> = [id("a"), id("b"), id("c")].into_iter().collect();
    assert_eq!(collected_ids(coordinator.state()), expected);
    assert_eq!(detail.calls(&id("b")), 1);

    let csv = std::fs::read_to_string(export_path).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.starts_with("title,year,director,genres,country,language,rating,votes,url"));
}

#[tokio::test]
async fn test_empty_page_ends_crawl() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 10, 2, 2);

    let lister = MockLister::new(vec![id("a"), id("b"), id("b"), id("c")]);
    let calls = lister.calls.clone();
    let detail = Arc::new(MockDetail::default());

    let mut coordinator = coordinator(config, lister, detail, true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
    assert_eq!(summary.collected, 3);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 10, 3, 10);

    let lister = MockLister::new(vec![id("a"), id("c")]);
    let detail = Arc::new(MockDetail::default().with(id("c"), Behavior::FailTimes(2)));

    let mut coordinator = coordinator(config, lister, detail.clone(), true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(detail.calls(&id("c")), 3);
    assert!(collected_ids(coordinator.state()).contains(&id("c")));
    assert_eq!(summary.collected, 2);
    assert!(summary.abandoned.is_empty());
}

#[tokio::test]
async fn test_missing_rating_is_skipped_without_retry() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 10, 3, 10);

    let lister = MockLister::new(vec![id("a"), id("d")]);
    let detail = Arc::new(MockDetail::default().with(id("d"), Behavior::NoRating));

    let mut coordinator = coordinator(config, lister, detail.clone(), true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(detail.calls(&id("d")), 1);
    assert_eq!(summary.skipped, 1);
    assert!(!collected_ids(coordinator.state()).contains(&id("d")));
}

#[tokio::test]
async fn test_permanent_failure_is_bounded() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 10, 3, 10);

    let lister = MockLister::new(vec![id("a"), id("e")]);
    let detail = Arc::new(MockDetail::default().with(id("e"), Behavior::AlwaysFail));

    let mut coordinator = coordinator(config, lister, detail.clone(), true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(detail.calls(&id("e")), 3);
    assert_eq!(summary.abandoned, vec![id("e")]);
    assert_eq!(summary.phase, CrawlPhase::Done);
}

#[tokio::test]
async fn test_result_is_independent_of_pool_size() {
    let mut results = Vec::new();

    for workers in [1, 3, 15] {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(dir.path(), 1000, workers, 50);

        let lister = MockLister::new(listing_with_duplicates());
        let detail = Arc::new(MockDetail::default());

        let mut coordinator = coordinator(config, lister, detail.clone(), true);
        let summary = coordinator.run().await.expect("Crawl failed");

        assert_eq!(summary.collected, 500, "workers = {}", workers);
        assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
        assert_eq!(detail.total.load(Ordering::SeqCst), 500);

        let ids = collected_ids(coordinator.state());
        assert_eq!(ids.len(), coordinator.state().len());
        results.push(ids);
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[tokio::test]
async fn test_partial_target_is_independent_of_pool_size() {
    let mut results = Vec::new();

    for workers in [1, 3, 15] {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(dir.path(), 300, workers, 50);

        let lister = MockLister::new(listing_with_duplicates());
        let detail = Arc::new(MockDetail::default());

        let mut coordinator = coordinator(config, lister, detail, true);
        let summary = coordinator.run().await.expect("Crawl failed");

        assert_eq!(summary.collected, 300);
        assert_eq!(summary.stop_reason, StopReason::TargetReached);
        results.push(collected_ids(coordinator.state()));
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    let ids: Vec<String> = (0..300).map(|i| id(&i.to_string())).collect();

    let baseline = {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(dir.path(), 120, 4, 25);
        let mut coordinator = coordinator(
            config,
            MockLister::new(ids.clone()),
            Arc::new(MockDetail::default()),
            true,
        );
        coordinator.run().await.expect("Crawl failed");
        collected_ids(coordinator.state())
    };

    let dir = TempDir::new().unwrap();

    // First run is interrupted partway through a batch
    let config = create_test_config(dir.path(), 120, 4, 25);
    let detail = Arc::new(MockDetail::default());
    let mut first = coordinator(config, MockLister::new(ids.clone()), detail.clone(), true);
    detail.cancel_after(first.cancel_token(), 40);
    let summary = first.run().await.expect("Crawl failed");
    assert_eq!(summary.phase, CrawlPhase::Aborted);
    assert!(summary.collected < 120);

    // Second run resumes from the checkpoint
    let config = create_test_config(dir.path(), 120, 4, 25);
    let mut second = coordinator(
        config,
        MockLister::new(ids),
        Arc::new(MockDetail::default()),
        false,
    );
    let summary = second.run().await.expect("Crawl failed");

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.collected, 120);
    assert_eq!(collected_ids(second.state()), baseline);
}

#[tokio::test]
async fn test_cancellation_saves_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 1000, 3, 50);
    let checkpoint_path = config.output.checkpoint_path.clone();

    let detail = Arc::new(MockDetail::default());
    let mut coordinator = coordinator(
        config,
        MockLister::new(listing_with_duplicates()),
        detail.clone(),
        true,
    );
    detail.cancel_after(coordinator.cancel_token(), 75);

    let summary = coordinator.run().await.expect("Crawl failed");
    assert_eq!(summary.phase, CrawlPhase::Aborted);
    assert_eq!(summary.stop_reason, StopReason::Cancelled);

    let checkpoint = JsonCheckpointStore::new(&checkpoint_path, "")
        .load()
        .unwrap()
        .expect("Checkpoint should exist after cancellation");
    assert_eq!(checkpoint.collected.len(), summary.collected);
    assert_eq!(checkpoint.cursor, coordinator.state().cursor);

    // The interrupted batch is listed again on resume
    assert_eq!(checkpoint.cursor.offset, 50);
}

#[tokio::test]
async fn test_checkpoints_never_shrink() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), 60, 5, 20);
    config.output.checkpoint_every = 1;

    let lengths = Arc::new(Mutex::new(Vec::new()));
    let store = Box::new(RecordingStore {
        inner: JsonCheckpointStore::new(&config.output.checkpoint_path, ""),
        lengths: lengths.clone(),
    });

    let ids: Vec<String> = (0..100).map(|i| id(&i.to_string())).collect();
    let detail = MockDetail::default()
        .with(id("3"), Behavior::NoRating)
        .with(id("7"), Behavior::AlwaysFail)
        .with(id("11"), Behavior::FailTimes(1));

    let mut coordinator = Coordinator::new(
        config,
        MockLister::new(ids),
        Arc::new(detail),
        store,
        "",
        true,
    )
    .unwrap();
    let summary = coordinator.run().await.expect("Crawl failed");

    let lengths = lengths.lock().unwrap();
    assert!(lengths.len() >= 3);
    assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
    assert!(lengths.iter().all(|&len| len <= 60));
    assert_eq!(*lengths.last().unwrap(), summary.collected);
}

#[tokio::test]
async fn test_failed_list_rounds_trigger_cooldown() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), 2, 2, 10);
    config.retry.max_attempts = 2;
    config.retry.global_cooldown_ms = 50;

    // Three rounds of two failed attempts each
    let lister = MockLister::new(vec![id("a"), id("b")]).failing_first(6);
    let calls = lister.calls.clone();

    let started = std::time::Instant::now();
    let mut coordinator = coordinator(config, lister, Arc::new(MockDetail::default()), true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.phase, CrawlPhase::Done);
    assert_eq!(summary.collected, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
    assert!(started.elapsed() >= std::time::Duration::from_millis(50));
}

#[tokio::test]
async fn test_seed_table_prefilters_identifiers() {
    let dir = TempDir::new().unwrap();
    let seed_path = dir.path().join("seed.csv");
    export_records(&seed_path, &[record(&id("a")), record(&id("b"))]).unwrap();

    let mut config = create_test_config(dir.path(), 4, 2, 10);
    config.output.seed_path = Some(seed_path.to_string_lossy().into_owned());

    let lister = MockLister::new(vec![id("a"), id("b"), id("c"), id("d"), id("e")]);
    let detail = Arc::new(MockDetail::default());

    let mut coordinator = coordinator(config, lister, detail.clone(), true);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.collected, 4);
    assert_eq!(detail.calls(&id("a")), 0);
    assert_eq!(detail.calls(&id("b")), 0);
    assert_eq!(detail.calls(&id("e")), 0);

    let expected: BTreeSet<_> = [id("a"), id("b"), id("c"), id("d")].into_iter().collect();
    assert_eq!(collected_ids(coordinator.state()), expected);
}

#[tokio::test]
async fn test_checkpoint_above_target_finishes_immediately() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3, 2, 10);

    let state = CrawlState::from_records(
        (0..5).map(|i| record(&id(&i.to_string()))).collect(),
        Cursor::start(10).advance(5),
        5,
    );
    JsonCheckpointStore::new(&config.output.checkpoint_path, "")
        .save(&state)
        .unwrap();

    let lister = MockLister::new(vec![id("9")]);
    let calls = lister.calls.clone();
    let mut coordinator = coordinator(config, lister, Arc::new(MockDetail::default()), false);
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.collected, 5);
    assert_eq!(summary.target, 5);
    assert_eq!(summary.stop_reason, StopReason::TargetReached);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_listing_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3, 2, 10);

    let mut lister = MockLister::new(vec![id("a")]);
    lister.unreachable = true;
    let calls = lister.calls.clone();

    let mut coordinator = coordinator(config, lister, Arc::new(MockDetail::default()), true);
    let result = coordinator.run().await;

    assert!(matches!(result, Err(CrawlError::Unreachable { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_snapshots_follow_cadence() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), 5, 2, 2);
    config.output.snapshot_every = Some(2);

    let ids: Vec<String> = (0..10).map(|i| id(&i.to_string())).collect();
    let mut coordinator = coordinator(
        config,
        MockLister::new(ids),
        Arc::new(MockDetail::default()),
        true,
    );
    let summary = coordinator.run().await.expect("Crawl failed");
    assert_eq!(summary.collected, 5);

    assert!(dir.path().join("movies_2.csv").exists());
    assert!(dir.path().join("movies_4.csv").exists());
    assert!(!dir.path().join("movies_5.csv").exists());
    assert!(dir.path().join("movies.csv").exists());

    let snapshot = std::fs::read_to_string(dir.path().join("movies_4.csv")).unwrap();
    assert_eq!(snapshot.lines().count(), 5);
}
