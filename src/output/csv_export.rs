//! Tabular export of collected records
//!
//! Exports are written to a temporary sibling and renamed into place, so a
//! reader never sees a half-written table.

use crate::state::Record;
use crate::url::normalize_identifier;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Column order of every export
pub const CSV_COLUMNS: [&str; 9] = [
    "title", "year", "director", "genres", "country", "language", "rating", "votes", "url",
];

/// Writes `records` to `path` as UTF-8 CSV with a header row
///
/// # Arguments
///
/// * `path` - Destination file; parent directories are created
/// * `records` - Records in the order they should appear
///
/// # Returns
///
/// * `Ok(())` - The table was written and moved into place
/// * `Err(CrawlError)` - Writing or renaming failed
pub fn export_records(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path(path);
    if let Err(e) = write_table(&temp, records) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    fs::rename(&temp, path)?;

    tracing::debug!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}

fn write_table(path: &Path, records: &[Record]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        // serialize() only emits the header alongside the first row
        writer.write_record(CSV_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Loads records from a previously exported table
///
/// Rows that fail to deserialize, or whose `url` is not a valid identifier,
/// are skipped with a warning. Identifiers are normalized the same way as
/// listing entries.
pub fn load_seed(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();

    for (line, row) in reader.deserialize::<Record>().enumerate() {
        let mut record = match row {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping seed row {}: {}", line + 2, e);
                continue;
            }
        };

        match normalize_identifier(&record.id) {
            Ok(id) => record.id = id,
            Err(e) => {
                tracing::warn!("Skipping seed row {}: {}", line + 2, e);
                continue;
            }
        }
        records.push(record);
    }

    Ok(records)
}

/// Path of the snapshot taken at `count` records
///
/// `data/movies.csv` at 1000 records becomes `data/movies_1000.csv`.
pub fn snapshot_path(export_path: &Path, count: usize) -> PathBuf {
    let stem = export_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let name = match export_path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, count, ext.to_string_lossy()),
        None => format!("{}_{}", stem, count),
    };
    export_path.with_file_name(name)
}
