//! Crawl summaries and checkpoint inspection
//!
//! This module provides the end-of-run summary and the read-only status view
//! built from an existing checkpoint.

use crate::state::{CrawlPhase, Cursor, Record};
use crate::storage::{CheckpointStore, JsonCheckpointStore};
use crate::Result;
use chrono::{DateTime, Local};
use std::fmt;
use std::fs;
use std::path::Path;

/// Number of records shown by the status view
pub const RECENT_RECORDS: usize = 5;

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The collected count reached the target
    TargetReached,

    /// The listing returned an empty page
    SourceExhausted,

    /// The operator cancelled the run
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TargetReached => "target reached",
            StopReason::SourceExhausted => "source exhausted",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of one crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Records held at the end of the run, including resumed ones
    pub collected: usize,

    pub target: usize,

    /// Identifiers that ended in a skip during this run
    pub skipped: usize,

    /// Identifiers whose retries ran out during this run
    pub abandoned: Vec<String>,

    /// Listing pages successfully fetched during this run
    pub pages_fetched: usize,

    pub stop_reason: StopReason,

    /// Terminal phase, `Done` or `Aborted`
    pub phase: CrawlPhase,
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");
    println!("  Final phase: {}", summary.phase);
    println!("  Stop reason: {}", summary.stop_reason);
    println!("  Collected: {}/{}", summary.collected, summary.target);
    println!("  List pages fetched: {}", summary.pages_fetched);
    println!("  Skipped: {}", summary.skipped);
    println!("  Abandoned: {}", summary.abandoned.len());

    if !summary.abandoned.is_empty() {
        println!();
        println!("Abandoned identifiers:");
        for id in &summary.abandoned {
            println!("  - {}", id);
        }
    }
}

/// Snapshot of a checkpoint for the status view
#[derive(Debug, Clone)]
pub struct CheckpointStatus {
    /// Modification time of the checkpoint file
    pub updated_at: Option<DateTime<Local>>,

    pub collected: usize,
    pub target: usize,
    pub cursor: Cursor,

    /// Most recently collected records, newest last
    pub recent: Vec<Record>,
}

/// Reads the checkpoint at `path` without touching it
///
/// # Returns
///
/// * `Ok(Some(CheckpointStatus))` - A checkpoint exists
/// * `Ok(None)` - No checkpoint has been written yet
/// * `Err(CrawlError)` - The checkpoint exists but cannot be read
pub fn load_status(path: &Path) -> Result<Option<CheckpointStatus>> {
    let store = JsonCheckpointStore::new(path, "");
    let Some(checkpoint) = store.load()? else {
        return Ok(None);
    };

    let updated_at = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Local>::from);

    let skip = checkpoint.collected.len().saturating_sub(RECENT_RECORDS);
    Ok(Some(CheckpointStatus {
        updated_at,
        collected: checkpoint.collected.len(),
        target: checkpoint.target,
        cursor: checkpoint.cursor,
        recent: checkpoint.collected.into_iter().skip(skip).collect(),
    }))
}

/// Prints the status view to stdout
pub fn print_status(status: &CheckpointStatus) {
    println!("=== Crawl Status ===\n");
    match status.updated_at {
        Some(at) => println!("  Last update: {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  Last update: unknown"),
    }

    let percentage = if status.target > 0 {
        (status.collected as f64 / status.target as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "  Collected: {}/{} ({:.1}%)",
        status.collected, status.target, percentage
    );
    println!(
        "  Cursor: offset {} (page size {})",
        status.cursor.offset, status.cursor.page_size
    );

    if !status.recent.is_empty() {
        println!();
        println!("Most recent records:");
        for record in &status.recent {
            println!("  - {} ({}) {:.1}", record.title, record.year, record.rating);
        }
    }
}
