use crate::state::CrawlState;
use crate::storage::traits::{
    Checkpoint, CheckpointRef, CheckpointStore, StorageError, StorageResult, CHECKPOINT_VERSION,
};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Checkpoint store writing a single JSON file
///
/// Saves go to `<path>.tmp` first, are flushed and synced, and then renamed
/// over `<path>`. The rename is the commit point.
pub struct JsonCheckpointStore {
    path: PathBuf,
    config_hash: String,
}

impl JsonCheckpointStore {
    /// Creates a store at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the checkpoint file
    /// * `config_hash` - Hash of the configuration, recorded in every save
    pub fn new(path: impl Into<PathBuf>, config_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            config_hash: config_hash.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_temp(&self, temp: &Path, state: &CrawlState) -> StorageResult<()> {
        let file = File::create(temp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &CheckpointRef::new(state, &self.config_hash))?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, state: &CrawlState) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        if let Err(e) = self.write_temp(&temp, state) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        tracing::debug!(
            "Checkpoint saved: {} records, offset {}",
            state.len(),
            state.cursor.offset
        );
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        Ok(Some(checkpoint))
    }
}
