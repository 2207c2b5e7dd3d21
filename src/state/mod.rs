//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Record`: One collected catalogue entry
//! - `Deduplicator`: The set of identifiers that already produced a record
//! - `CrawlState`: Collected records, seen set, cursor and target
//! - `CrawlPhase`: Where the coordinator is in its loop

mod crawl_phase;
mod crawl_state;
mod dedup;
mod record;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use crawl_state::{CrawlState, Cursor, MergeOutcome};
pub use dedup::Deduplicator;
pub use record::Record;
