// Append-only JSONL blob store

use crate::blob::{BlobStore, validate_key};
use crate::clock::now_ms;
use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Line count past which a write compacts the log
pub const AUTO_COMPACT_LINES: usize = 64;

/// One line of the log: every value of a single snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Batch {
    updated_at: i64,
    values: BTreeMap<String, String>,
}

/// Blob store kept as an append-only log of `{updated_at, values}` lines.
///
/// Each snapshot is one line, so a torn write drops the whole snapshot and
/// never half of it. The later line in the file wins regardless of its
/// timestamp. Appends and compaction serialize on a sidecar lock file that is
/// never replaced, and a write that pushes the log past
/// [`AUTO_COMPACT_LINES`] compacts it under the same lock.
pub struct JsonlBlobStore {
    path: PathBuf,
    lock_path: PathBuf,
    /// Lines in the log as last seen by this handle
    lines: usize,
}

impl JsonlBlobStore {
    /// Open or create a log in the `.tasktally` subdirectory of `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(".tasktally");
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let path = base_path.join("state.jsonl");
        let lock_path = base_path.join("state.jsonl.lock");
        let (_, lines) = read_latest(&path)?;
        info!(path = ?path, lines, "Opened JSONL blob store");
        Ok(Self { path, lock_path, lines })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive writer lock. Released when the file is dropped.
    fn lock(&self) -> Result<File> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .context("Failed to open lock file")?;
        lock.lock_exclusive().context("Failed to acquire file lock")?;
        Ok(lock)
    }

    fn append(&mut self, batch: &Batch) -> Result<()> {
        let _lock = self.lock()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open JSONL file for appending")?;

        let mut line = serde_json::to_string(batch)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        self.lines += 1;

        if self.lines > AUTO_COMPACT_LINES {
            // The snapshot is already durable; a failed compaction only leaves the log long
            if let Err(e) = self.compact_locked() {
                warn!(path = ?self.path, error = ?e, "Automatic compaction failed");
            }
        }
        Ok(())
    }

    /// Rewrite the log as a single line holding the latest value per key.
    ///
    /// Returns the number of lines dropped.
    pub fn compact(&mut self) -> Result<usize> {
        let _lock = self.lock()?;
        self.compact_locked()
    }

    /// Caller holds the writer lock
    fn compact_locked(&mut self) -> Result<usize> {
        if !self.path.exists() {
            self.lines = 0;
            return Ok(0);
        }

        let (latest, line_count) = read_latest(&self.path)?;
        let kept = if latest.is_empty() { 0 } else { 1 };

        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut tmp = File::create(&tmp_path).context("Failed to create compaction file")?;
        if !latest.is_empty() {
            let batch = Batch {
                updated_at: now_ms(),
                values: latest.into_iter().collect(),
            };
            writeln!(tmp, "{}", serde_json::to_string(&batch)?)?;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path).context("Failed to replace JSONL file")?;

        self.lines = kept;
        let dropped = line_count.saturating_sub(kept);
        info!(kept, dropped, "Compacted JSONL log");
        Ok(dropped)
    }
}

impl BlobStore for JsonlBlobStore {
    fn is_available(&self) -> bool {
        self.path.parent().map(|dir| dir.is_dir()).unwrap_or(false)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let (mut latest, _) = read_latest(&self.path)?;
        Ok(latest.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value.to_string())])
    }

    fn set_many(&mut self, entries: &[(&str, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut values = BTreeMap::new();
        for (key, value) in entries {
            validate_key(key)?;
            values.insert(key.to_string(), value.clone());
        }

        self.append(&Batch {
            updated_at: now_ms(),
            values,
        })?;
        debug!(count = entries.len(), "Appended snapshot");
        Ok(())
    }
}

/// Read the latest value per key, plus the number of parsed lines.
///
/// Lines are applied in file order, so the later line wins. Lines that fail
/// to read or parse, including a torn final line, are skipped with a warning.
fn read_latest(path: &Path) -> Result<(HashMap<String, String>, usize)> {
    if !path.exists() {
        return Ok((HashMap::new(), 0));
    }

    let file = File::open(path).context("Failed to open JSONL file")?;
    let reader = BufReader::new(file);
    let mut values: HashMap<String, String> = HashMap::new();
    let mut parsed = 0;

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let batch: Batch = match serde_json::from_str(&line) {
            Ok(b) => b,
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
        parsed += 1;
        values.extend(batch.values);
    }

    Ok((values, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn line_count(store: &JsonlBlobStore) -> usize {
        fs::read_to_string(store.path()).unwrap().lines().count()
    }

    #[test]
    fn test_set_and_get_latest() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        store.set("display-mode-flag", "false").unwrap();
        store.set("display-mode-flag", "true").unwrap();

        assert!(store.is_available());
        assert_eq!(store.get("display-mode-flag").unwrap().as_deref(), Some("true"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_later_line_wins_over_newer_timestamp() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        // A line stamped an hour ahead, as left behind by a clock that stepped back since
        let ahead = now_ms() + 3_600_000;
        fs::write(
            store.path(),
            format!(
                "{{\"updated_at\":{},\"values\":{{\"active-task-id\":\"\\\"a\\\"\"}}}}\n",
                ahead
            ),
        )
        .unwrap();
        assert_eq!(store.get("active-task-id").unwrap().as_deref(), Some("\"a\""));

        store.set("active-task-id", "null").unwrap();
        assert_eq!(store.get("active-task-id").unwrap().as_deref(), Some("null"));
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        store.set("tasks", "[]").unwrap();
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_set_many_appends_one_line() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        store
            .set_many(&[("tasks", "[]".to_string()), ("active-task-id", "null".to_string())])
            .unwrap();
        store.set_many(&[]).unwrap();

        assert_eq!(line_count(&store), 1);
        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get("active-task-id").unwrap().as_deref(), Some("null"));
    }

    #[test]
    fn test_torn_snapshot_is_ignored_whole() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        store
            .set_many(&[("tasks", "[1]".to_string()), ("active-task-id", "\"a\"".to_string())])
            .unwrap();
        let intact = fs::read_to_string(store.path()).unwrap();

        store
            .set_many(&[("tasks", "[]".to_string()), ("active-task-id", "null".to_string())])
            .unwrap();
        let full = fs::read_to_string(store.path()).unwrap();

        // Cut the second snapshot off partway, at every possible length
        for cut in intact.len() + 1..full.len() - 1 {
            fs::write(store.path(), &full[..cut]).unwrap();
            assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[1]"), "cut at {}", cut);
            assert_eq!(store.get("active-task-id").unwrap().as_deref(), Some("\"a\""), "cut at {}", cut);
        }
    }

    #[test]
    fn test_compact_keeps_latest_per_key() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        for i in 0..5 {
            store.set("tasks", &format!("[{}]", i)).unwrap();
        }
        store.set("display-mode-flag", "true").unwrap();

        let dropped = store.compact().unwrap();
        assert_eq!(dropped, 5);

        assert_eq!(line_count(&store), 1);
        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[4]"));
        assert_eq!(store.get("display-mode-flag").unwrap().as_deref(), Some("true"));

        // Appends after compaction land in the new file
        store.set("tasks", "[5]").unwrap();
        assert_eq!(line_count(&store), 2);
        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[5]"));
    }

    #[test]
    fn test_compact_missing_file() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();
        assert_eq!(store.compact().unwrap(), 0);
    }

    #[test]
    fn test_log_compacts_itself() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();

        store.set("display-mode-flag", "true").unwrap();
        for i in 0..1000 {
            store.set("tasks", &format!("[{}]", i)).unwrap();
            assert!(line_count(&store) <= AUTO_COMPACT_LINES);
        }

        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[999]"));
        assert_eq!(store.get("display-mode-flag").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_open_counts_existing_lines() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = JsonlBlobStore::open(temp.path()).unwrap();
            for i in 0..AUTO_COMPACT_LINES {
                store.set("tasks", &format!("[{}]", i)).unwrap();
            }
            assert_eq!(line_count(&store), AUTO_COMPACT_LINES);
        }

        // A fresh handle picks up where the last one left off
        let mut store = JsonlBlobStore::open(temp.path()).unwrap();
        store.set("tasks", "[]").unwrap();
        assert_eq!(line_count(&store), 1);
        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[]"));
    }
}
