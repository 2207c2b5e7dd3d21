//! Storage module for persisting crawl progress
//!
//! This module handles checkpointing, including:
//! - Atomic snapshots of collected records and the listing cursor
//! - Loading a snapshot back into a resumable crawl state

mod checkpoint;
mod traits;

pub use checkpoint::JsonCheckpointStore;
pub use traits::{Checkpoint, CheckpointStore, StorageError, StorageResult, CHECKPOINT_VERSION};
