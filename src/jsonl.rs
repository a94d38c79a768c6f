// JSONL journal file operations

use fs2::FileExt;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::record::Record;

/// Append records to a JSONL file as a single durable write
///
/// All lines are written under an exclusive lock and flushed with one
/// `sync_all`, so either every line of the batch is on disk when this returns
/// or an error is reported.
pub fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    // Lock is released when file is dropped
    file.lock_exclusive()?;
    file.write_all(&buf)?;
    file.sync_all()?;

    debug!(file = ?path, count = records.len(), "Appended records to journal");
    Ok(())
}

/// Cut a JSONL file back to `len` bytes, dropping anything appended after it
///
/// Used to take back a batch whose index commit failed. A missing file is
/// left missing.
pub fn truncate_jsonl(path: &Path, len: u64) -> io::Result<()> {
    let file = match OpenOptions::new().write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    file.lock_exclusive()?;
    file.set_len(len)?;
    file.sync_all()?;

    debug!(file = ?path, len, "Truncated journal");
    Ok(())
}

/// Read all records from a JSONL file, returning latest version per ID
///
/// For records with duplicate IDs the one with the highest `updated_at` wins;
/// on equal timestamps the later line wins. Malformed lines are skipped with a
/// warning; any other read failure is an error.
pub fn read_jsonl_latest<T>(path: &Path) -> io::Result<HashMap<String, T>>
where
    T: DeserializeOwned + Record,
{
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records: HashMap<String, T> = HashMap::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(file = ?path, line = line_num + 1, error = ?e, "Line is not UTF-8, skipping");
                continue;
            }
            // Any other read error would repeat on every following line
            Err(e) => {
                warn!(file = ?path, line = line_num + 1, error = ?e, "Failed to read journal");
                return Err(e);
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let record: T = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
                continue;
            }
        };

        let keep = records
            .get(record.id())
            .is_none_or(|existing| record.updated_at() >= existing.updated_at());
        if keep {
            records.insert(record.id().to_string(), record);
        }
    }

    debug!(file = ?path, count = records.len(), "Loaded latest records from journal");

    Ok(records)
}
