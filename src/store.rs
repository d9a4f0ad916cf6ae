//! Durable task storage: one JSON record per task.
//!
//! [`TaskStore`] is the persistence seam. The shipped implementations
//! are [`JsonFileStore`] (a directory of `<id>.json` documents) and
//! [`MemoryStore`] (ephemeral, for tests and embedders that do not want
//! disk state). Records are independent: writing one task's record can
//! never corrupt another's.

use crate::error::{ChimeError, Result};
use crate::task::Task;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Durable, one-record-per-task persistence.
pub trait TaskStore: Send + Sync {
    /// Read every persisted record. Order is not significant.
    fn load_all(&self) -> Result<Vec<Task>>;

    /// Overwrite the full record keyed by the task's id.
    fn save(&self, task: &Task) -> Result<()>;

    /// Remove the record for `id`. Deleting an absent record is not an
    /// error.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Task store backed by a directory of pretty-printed JSON documents,
/// one per task id.
///
/// A missing directory loads as the empty set. An unreadable or
/// unparseable record is skipped with a logged warning so one corrupt
/// file cannot take down the rest.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory is created lazily
    /// on the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl TaskStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Task>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ChimeError::Store(format!("cannot read state dir: {e}")));
            }
        };

        let mut tasks = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("cannot read state dir entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!("skipping task record {}: {e}", path.display()),
            }
        }
        Ok(tasks)
    }

    fn save(&self, task: &Task) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ChimeError::Store(format!("cannot create state dir: {e}")))?;
        let json = serde_json::to_string_pretty(task)
            .map_err(|e| ChimeError::Store(format!("cannot serialize record: {e}")))?;
        std::fs::write(self.record_path(&task.id), json)
            .map_err(|e| ChimeError::Store(format!("cannot write record: {e}")))?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        match std::fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChimeError::Store(format!("cannot delete record: {e}"))),
        }
    }
}

fn read_record(path: &Path) -> Result<Task> {
    let bytes =
        std::fs::read(path).map_err(|e| ChimeError::Store(format!("cannot read record: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ChimeError::Store(format!("cannot parse record: {e}")))
}

/// In-memory task store. State is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Task>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Task>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().cloned().collect())
    }

    fn save(&self, task: &Task) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(id);
        Ok(())
    }
}
