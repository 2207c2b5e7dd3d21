/// Phase definitions for the coordinator's crawl loop
use std::fmt;

/// Represents where the coordinator currently is in its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    // ===== Loop Phases =====
    /// Requesting the listing page at the current cursor
    FetchList,

    /// Submitting detail fetches for new identifiers
    Dispatch,

    /// Draining task reports and merging records
    Collect,

    /// Writing a checkpoint or snapshot if a cadence was crossed
    Persist,

    // ===== Terminal Phases =====
    /// Target reached or listing exhausted
    Done,

    /// Stopped early by operator cancellation
    Aborted,
}

impl CrawlPhase {
    /// Returns true if the loop has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchList => "fetch_list",
            Self::Dispatch => "dispatch",
            Self::Collect => "collect",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
