use std::collections::HashSet;

/// Tracks which identifiers have already produced a record
///
/// The deduplicator lives inside [`CrawlState`](super::CrawlState) and is only
/// mutated through `&mut` access by the coordinator's merge step, so
/// [`check_and_mark`](Self::check_and_mark) is a single atomic test-and-set
/// even though results arrive from many workers.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    /// Creates an empty deduplicator
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `id` has not produced a record yet
    pub fn is_new(&self, id: &str) -> bool {
        !self.seen.contains(id)
    }

    /// Marks `id` as seen
    pub fn mark_seen(&mut self, id: &str) {
        if !self.seen.contains(id) {
            self.seen.insert(id.to_string());
        }
    }

    /// Marks `id` as seen, returning true only if it was new
    pub fn check_and_mark(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    /// Number of identifiers seen so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
