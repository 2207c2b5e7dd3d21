use crate::state::{Deduplicator, Record};
use serde::{Deserialize, Serialize};

/// Pagination position on the listing endpoint
///
/// Only the listing fetcher interprets the fields; everything else treats the
/// cursor as an opaque value to store and hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Offset of the first entry of the next page
    pub offset: u64,

    /// Number of entries requested per page
    pub page_size: u32,
}

impl Cursor {
    /// A cursor at the beginning of the listing
    pub fn start(page_size: u32) -> Self {
        Self {
            offset: 0,
            page_size,
        }
    }

    /// Returns the cursor moved past `examined` entries
    pub fn advance(self, examined: usize) -> Self {
        Self {
            offset: self.offset + examined as u64,
            page_size: self.page_size,
        }
    }
}

/// Result of merging one record into the crawl state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Record was new and has been appended
    Added,

    /// A record with the same id was already collected
    Duplicate,

    /// The target has been reached; the record was not merged
    AtCapacity,
}

/// Progress of one crawl
///
/// `collected` is append-only and ordered by completion, `seen` always covers
/// every collected id, and `collected.len()` never exceeds `target`.
#[derive(Debug, Clone)]
pub struct CrawlState {
    collected: Vec<Record>,
    seen: Deduplicator,

    /// Where the next listing page starts
    pub cursor: Cursor,

    target: usize,
}

impl CrawlState {
    /// Creates an empty state at the start of the listing
    pub fn new(target: usize, page_size: u32) -> Self {
        Self {
            collected: Vec::new(),
            seen: Deduplicator::new(),
            cursor: Cursor::start(page_size),
            target,
        }
    }

    /// Rebuilds a state from previously collected records
    ///
    /// Records with an id already present are dropped, and `seen` is derived
    /// from what remains. If more records exist than `target` allows, the
    /// target is raised to keep everything already collected.
    pub fn from_records(records: Vec<Record>, cursor: Cursor, target: usize) -> Self {
        let mut seen = Deduplicator::new();
        let mut collected = Vec::with_capacity(records.len());
        for record in records {
            if seen.check_and_mark(&record.id) {
                collected.push(record);
            }
        }

        let target = if collected.len() > target {
            tracing::warn!(
                "State already holds {} records, above the target of {}; keeping them all",
                collected.len(),
                target
            );
            collected.len()
        } else {
            target
        };

        Self {
            collected,
            seen,
            cursor,
            target,
        }
    }

    /// Atomically checks the record's id and appends it if it is new
    pub fn merge(&mut self, record: Record) -> MergeOutcome {
        if self.collected.len() >= self.target {
            return MergeOutcome::AtCapacity;
        }

        if !self.seen.check_and_mark(&record.id) {
            return MergeOutcome::Duplicate;
        }

        self.collected.push(record);
        MergeOutcome::Added
    }

    /// Returns true if `id` has not produced a record yet
    pub fn is_new(&self, id: &str) -> bool {
        self.seen.is_new(id)
    }

    /// Number of records still needed to reach the target
    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.collected.len())
    }

    /// Returns true once the target has been reached
    pub fn is_complete(&self) -> bool {
        self.collected.len() >= self.target
    }

    pub fn collected(&self) -> &[Record] {
        &self.collected
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn seen(&self) -> &Deduplicator {
        &self.seen
    }
}
