//! Filesystem-backed object store.
//!
//! Objects live at `<root>/<bucket>/<key>`. Writes go through
//! [`atomic_write`](crate::fs::atomic_write) so readers never observe a
//! partial body; last-modified comes from the file's mtime.

use super::{ObjectStore, StoreError, StoredObject, validate_key};
use crate::fs::atomic_write;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// [`ObjectStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StoreError::InvalidKey(format!("{}/{}", bucket, key)));
        }
        validate_key(bucket)?;
        validate_key(key)?;

        let mut path = self.root.join(bucket);
        for segment in key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }
}

impl ObjectStore for FsStore {
    fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let path = self.object_path(bucket, key)?;

        let body = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::not_found(bucket, key),
            _ => StoreError::Backend(format!("failed to read '{}': {}", path.display(), e)),
        })?;

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| {
                StoreError::Backend(format!(
                    "failed to read mtime of '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(StoredObject {
            body,
            last_modified: DateTime::<Utc>::from(modified),
        })
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        atomic_write(&path, body)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Backend(format!(
                "failed to delete '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn removal_command(&self, bucket: &str, key: &str) -> String {
        let shown = match self.object_path(bucket, key) {
            Ok(path) => path.display().to_string(),
            Err(_) => format!("{}/{}", bucket, key),
        };
        format!("rm {}", shell_words::quote(&shown))
    }
}
