//! Output module for exports and crawl summaries
//!
//! This module handles:
//! - Exporting collected records as CSV, including periodic snapshots
//! - Seeding a crawl from a previously exported table
//! - Summarizing a finished run and inspecting a checkpoint

mod csv_export;
pub mod stats;

pub use csv_export::{export_records, load_seed, snapshot_path, CSV_COLUMNS};
pub use stats::{
    load_status, print_status, print_summary, CheckpointStatus, CrawlSummary, StopReason,
};
