//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::{CrawlState, Cursor, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A loaded checkpoint
///
/// `seen` is not stored; it is rebuilt from `collected` when the checkpoint is
/// turned back into a [`CrawlState`].
#[derive(Debug, Clone, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub config_hash: String,
    pub cursor: Cursor,
    pub target: usize,
    pub collected: Vec<Record>,
}

impl Checkpoint {
    /// Rebuilds a crawl state for a run with the given target and page size
    ///
    /// The stored offset is kept; the page size follows the current
    /// configuration.
    pub fn into_state(self, target: usize, page_size: u32) -> CrawlState {
        let cursor = Cursor {
            offset: self.cursor.offset,
            page_size,
        };
        CrawlState::from_records(self.collected, cursor, target)
    }
}

/// Borrowed view of a crawl state used when writing a checkpoint
#[derive(Debug, Serialize)]
pub(crate) struct CheckpointRef<'a> {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub config_hash: &'a str,
    pub cursor: Cursor,
    pub target: usize,
    pub collected: &'a [Record],
}

impl<'a> CheckpointRef<'a> {
    pub fn new(state: &'a CrawlState, config_hash: &'a str) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            config_hash,
            cursor: state.cursor,
            target: state.target(),
            collected: state.collected(),
        }
    }
}

/// Trait for checkpoint backend implementations
///
/// Implementations must make `save` atomic from the reader's point of view: a
/// crash during `save` leaves either the previous checkpoint or the new one,
/// never a partial write.
pub trait CheckpointStore: Send + Sync {
    /// Durably persists the current state
    fn save(&self, state: &CrawlState) -> StorageResult<()>;

    /// Loads the most recent checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Checkpoint))` - A checkpoint exists
    /// * `Ok(None)` - Nothing has been saved yet
    /// * `Err(StorageError)` - A checkpoint exists but cannot be read
    fn load(&self) -> StorageResult<Option<Checkpoint>>;
}
