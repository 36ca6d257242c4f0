//! Keyed lock tables with native conditional writes.
//!
//! Unlike the object store, these backends can insert a record only if none
//! exists. When the conditional insert loses, the existing record is read:
//! - another holder: `NotGrabbed(None)`
//! - the same holder: `Maybe(PreconditionFailed)`, so a re-run of the same
//!   step is reported as "assume held, clean up" rather than success.
//!
//! Any other error during acquisition is reported as `Maybe`.

use super::record::LockRecord;
use super::{Acquire, Locker};
use crate::error::{Result, WardenError};
use crate::store::{StoreError, StoreOp, validate_key};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

fn held_by_same_holder(path: &str, holder: &str) -> StoreError {
    StoreError::PreconditionFailed {
        key: path.to_string(),
        detail: format!("lock already held by '{}'", holder),
    }
}

fn held_by_other(namespace: &str, path: &str, existing: &str, holder: &str) -> WardenError {
    WardenError::LockError(format!(
        "lock {} in table '{}' is held by '{}', not '{}'; refusing to release it",
        path, namespace, existing, holder
    ))
}

// ============================================================================
// In-memory table
// ============================================================================

#[derive(Debug, Default)]
struct TableInner {
    records: HashMap<(String, String), LockRecord>,
    faults: HashMap<(StoreOp, String), StoreError>,
}

/// In-process [`Locker`] keyed by `(table, path)`.
#[derive(Debug, Default)]
pub struct MemoryLockTable {
    inner: Mutex<TableInner>,
}

impl MemoryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Current holder of a lock, if any.
    pub fn holder(&self, table: &str, path: &str) -> Option<String> {
        self.lock()
            .records
            .get(&(table.to_string(), path.to_string()))
            .map(|r| r.uuid.clone())
    }

    /// Make `op` on `path` fail until cleared. `Put` covers acquisition,
    /// `Delete` covers release.
    pub fn fail(&self, op: StoreOp, path: &str, error: StoreError) {
        self.lock().faults.insert((op, path.to_string()), error);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }
}

impl Locker for MemoryLockTable {
    fn grab_lock(&self, table: &str, path: &str, holder: &str, reason: &str) -> Acquire {
        let mut inner = self.lock();
        if let Some(error) = inner.faults.get(&(StoreOp::Put, path.to_string())) {
            return Acquire::Maybe(error.clone());
        }

        let slot = (table.to_string(), path.to_string());
        match inner.records.get(&slot) {
            Some(existing) if existing.is_held_by(holder) => {
                Acquire::Maybe(held_by_same_holder(path, holder))
            }
            Some(_) => Acquire::NotGrabbed(None),
            None => {
                inner.records.insert(slot, LockRecord::new(holder, reason));
                Acquire::Grabbed
            }
        }
    }

    fn release_lock(&self, table: &str, path: &str, holder: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(error) = inner.faults.get(&(StoreOp::Delete, path.to_string())) {
            return Err(error.clone().into());
        }

        let slot = (table.to_string(), path.to_string());
        match inner.records.get(&slot) {
            None => Ok(()),
            Some(existing) if existing.is_held_by(holder) => {
                inner.records.remove(&slot);
                Ok(())
            }
            Some(existing) => Err(held_by_other(table, path, &existing.uuid, holder)),
        }
    }

    fn clear_hint(&self, table: &str, path: &str) -> String {
        format!("remove key '{}' from lock table '{}'", path, table)
    }
}

// ============================================================================
// File-backed table
// ============================================================================

/// What a lock file in a [`FileLockTable`] holds.
#[derive(Debug, Clone)]
pub enum LockState {
    Held(LockRecord),

    /// The file exists but does not parse, e.g. a writer died between
    /// creating and filling it. It still blocks acquisition.
    Unreadable(String),
}

/// Information about a lock found in a [`FileLockTable`].
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The lock path within its table.
    pub path: String,

    pub state: LockState,
}

impl LockInfo {
    /// The lock record, if the file parsed.
    pub fn record(&self) -> Option<&LockRecord> {
        match &self.state {
            LockState::Held(record) => Some(record),
            LockState::Unreadable(_) => None,
        }
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = match &self.state {
            LockState::Held(record) => record,
            LockState::Unreadable(error) => {
                return write!(f, "{} (unreadable: {})", self.path, error);
            }
        };

        write!(
            f,
            "{} (holder: {}, age: {}",
            self.path,
            record.uuid,
            record.age_string()
        )?;
        if let Some(reason) = &record.reason {
            write!(f, ", reason: {}", reason)?;
        }
        write!(f, ")")
    }
}

/// [`Locker`] storing one file per lock at `<root>/<table>/<path>`.
///
/// Acquisition uses `create_new`, so only one process can create a given
/// lock file.
#[derive(Debug, Clone)]
pub struct FileLockTable {
    root: PathBuf,
}

impl FileLockTable {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn table_dir(&self, table: &str) -> std::result::Result<PathBuf, StoreError> {
        if table.contains('/') {
            return Err(StoreError::InvalidKey(table.to_string()));
        }
        validate_key(table)?;
        Ok(self.root.join(table))
    }

    fn lock_path(&self, table: &str, path: &str) -> std::result::Result<PathBuf, StoreError> {
        validate_key(path)?;

        let mut file = self.table_dir(table)?;
        for segment in path.split('/') {
            file.push(segment);
        }
        Ok(file)
    }

    fn read_record(file: &Path) -> std::result::Result<Option<LockRecord>, StoreError> {
        let content = match fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "failed to read lock file '{}': {}",
                    file.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            StoreError::Serialization(format!(
                "failed to parse lock file '{}': {}",
                file.display(),
                e
            ))
        })
    }

    fn create(file: &Path, record: &LockRecord) -> std::result::Result<(), CreateError> {
        if let Some(parent) = file.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                CreateError::Other(StoreError::Backend(format!(
                    "failed to create lock directory '{}': {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let mut handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(file)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    CreateError::Exists
                } else {
                    CreateError::Other(StoreError::Backend(format!(
                        "failed to create lock file '{}': {}",
                        file.display(),
                        e
                    )))
                }
            })?;

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| CreateError::Other(StoreError::Serialization(e.to_string())))?;

        handle
            .write_all(json.as_bytes())
            .and_then(|()| handle.sync_all())
            .map_err(|e| {
                let _ = fs::remove_file(file);
                CreateError::Other(StoreError::Backend(format!(
                    "failed to write lock file '{}': {}",
                    file.display(),
                    e
                )))
            })
    }

    /// List all locks in a table, sorted by path. Files that do not parse are
    /// listed as [`LockState::Unreadable`].
    pub fn list(&self, table: &str) -> Result<Vec<LockInfo>> {
        let dir = self.table_dir(table)?;

        let mut locks = Vec::new();
        if !dir.exists() {
            return Ok(locks);
        }

        let mut pending = vec![dir.clone()];
        while let Some(current) = pending.pop() {
            let entries = fs::read_dir(&current).map_err(|e| {
                StoreError::Backend(format!(
                    "failed to read lock directory '{}': {}",
                    current.display(),
                    e
                ))
            })?;

            for entry in entries {
                let entry = entry.map_err(|e| {
                    StoreError::Backend(format!("failed to read lock directory entry: {}", e))
                })?;
                let file = entry.path();
                if file.is_dir() {
                    pending.push(file);
                    continue;
                }

                let state = match Self::read_record(&file) {
                    Ok(Some(record)) => LockState::Held(record),
                    Ok(None) => continue,
                    Err(e) => LockState::Unreadable(e.to_string()),
                };
                let Ok(relative) = file.strip_prefix(&dir) else {
                    continue;
                };
                let path = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");

                locks.push(LockInfo { path, state });
            }
        }

        locks.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(locks)
    }
}

enum CreateError {
    Exists,
    Other(StoreError),
}

impl FileLockTable {
    /// Create `file` for `record`, re-reading the existing record through
    /// `read_existing` when the create loses.
    pub(super) fn grab_file(
        file: &Path,
        path: &str,
        record: &LockRecord,
        mut read_existing: impl FnMut(&Path) -> std::result::Result<Option<LockRecord>, StoreError>,
    ) -> Acquire {
        // A lock released between our create and read gets one more try.
        for _ in 0..2 {
            match Self::create(file, record) {
                Ok(()) => return Acquire::Grabbed,
                Err(CreateError::Other(e)) => return Acquire::Maybe(e),
                Err(CreateError::Exists) => match read_existing(file) {
                    Ok(Some(existing)) if existing.is_held_by(&record.uuid) => {
                        return Acquire::Maybe(held_by_same_holder(path, &record.uuid));
                    }
                    Ok(Some(_)) => return Acquire::NotGrabbed(None),
                    Ok(None) => continue,
                    Err(e) => return Acquire::NotGrabbed(Some(e)),
                },
            }
        }
        Acquire::NotGrabbed(None)
    }
}

impl Locker for FileLockTable {
    fn grab_lock(&self, table: &str, path: &str, holder: &str, reason: &str) -> Acquire {
        let file = match self.lock_path(table, path) {
            Ok(file) => file,
            Err(e) => return Acquire::NotGrabbed(Some(e)),
        };

        let record = LockRecord::new(holder, reason);
        let outcome = Self::grab_file(&file, path, &record, Self::read_record);
        match &outcome {
            Acquire::Grabbed => debug!(table, path, holder, "lock grabbed"),
            Acquire::Maybe(e) => {
                warn!(table, path, holder, error = %e, "lock create failed, outcome unknown")
            }
            Acquire::NotGrabbed(_) => {}
        }
        outcome
    }

    fn release_lock(&self, table: &str, path: &str, holder: &str) -> Result<()> {
        let file = self.lock_path(table, path)?;

        match Self::read_record(&file) {
            Ok(None) => return Ok(()),
            Ok(Some(existing)) if !existing.is_held_by(holder) => {
                return Err(held_by_other(table, path, &existing.uuid, holder));
            }
            Ok(Some(_)) => {}
            // Nobody can prove ownership of a record that does not parse.
            Err(StoreError::Serialization(detail)) => {
                warn!(table, path, holder, %detail, "removing unreadable lock file");
            }
            Err(e) => return Err(e.into()),
        }

        match fs::remove_file(&file) {
            Ok(()) => {
                debug!(table, path, holder, "lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend(format!(
                "failed to remove lock file '{}': {}",
                file.display(),
                e
            ))
            .into()),
        }
    }

    fn clear_hint(&self, table: &str, path: &str) -> String {
        let shown = match self.lock_path(table, path) {
            Ok(file) => file.display().to_string(),
            Err(_) => format!("{}/{}", table, path),
        };
        format!("rm {}", shell_words::quote(&shown))
    }
}
