//! Atomic object writes for the filesystem store.
//!
//! Every write follows the same pattern:
//! 1. Write the body to a uniquely named temporary file in the target directory
//! 2. Sync the file to disk (fsync)
//! 3. Rename it over the target
//!
//! Readers therefore see either the previous object or the new one, never a
//! partial body. Source and destination share a directory, so the rename
//! never crosses filesystems. `std::fs::rename` replaces an existing target on
//! both POSIX and Windows.
//!
//! A crash between steps can leave a `.{name}.{id}.tmp` file behind in the
//! target directory.

use crate::store::StoreError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to `path`, creating parent directories as needed.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<(), StoreError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::Backend(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;
    replace(&temp_path, path)
}

/// Temp file next to the target. The id suffix keeps concurrent writers of
/// the same key from clobbering each other's temp files.
fn generate_temp_path(target: &Path) -> Result<PathBuf, StoreError> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::InvalidKey(target.display().to_string()))?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, uuid::Uuid::now_v7().simple())))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path).map_err(|e| {
        StoreError::Backend(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        StoreError::Backend(format!("failed to write temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        StoreError::Backend(format!("failed to sync temporary file: {}", e))
    })
}

fn replace(source: &Path, target: &Path) -> Result<(), StoreError> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        StoreError::Backend(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    // Persist the directory entry as well.
    #[cfg(unix)]
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}
