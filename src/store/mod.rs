//! Object storage for release state, locks, logs, and halt flags.
//!
//! The [`ObjectStore`] trait models an S3-style key/value store: whole-object
//! get/put/delete with read-your-writes on a single key and no atomic
//! compare-and-swap. Everything that needs coordination on top of it goes
//! through the lock protocol in [`crate::locks`].
//!
//! Two backends are provided:
//! - [`MemoryStore`]: thread-safe in-process map with fault injection
//! - [`FsStore`]: one file per object under a root directory, written atomically

mod error;
mod fs_store;
mod memory;

pub use error::StoreError;
pub use fs_store::FsStore;
pub use memory::{MemoryStore, StoreOp};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// An object read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Raw object body.
    pub body: Vec<u8>,

    /// When the object was last written.
    pub last_modified: DateTime<Utc>,
}

/// A bucketed key/value object store.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Missing objects yield [`StoreError::NotFound`].
    fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;

    /// Create or overwrite an object.
    fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError>;

    /// Delete an object. Deleting a missing object succeeds.
    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Command an operator can run to delete an object by hand.
    fn removal_command(&self, bucket: &str, key: &str) -> String {
        format!("delete object '{}' from bucket '{}'", key, bucket)
    }
}

/// Fetch an object and decode its body as UTF-8.
pub fn get_string(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<String, StoreError> {
    let object = store.get(bucket, key)?;
    String::from_utf8(object.body)
        .map_err(|e| StoreError::Serialization(format!("object {}/{} is not UTF-8: {}", bucket, key, e)))
}

/// Write a string object.
pub fn put_string(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    body: &str,
) -> Result<(), StoreError> {
    store.put(bucket, key, body.as_bytes())
}

/// Fetch an object and deserialize its JSON body.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<T, StoreError> {
    let object = store.get(bucket, key)?;
    serde_json::from_slice(&object.body).map_err(|e| {
        StoreError::Serialization(format!("failed to parse {}/{}: {}", bucket, key, e))
    })
}

/// Serialize a value as JSON and write it.
pub fn put_json<T: Serialize>(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let body = serde_json::to_vec(value).map_err(|e| {
        StoreError::Serialization(format!("failed to serialize {}/{}: {}", bucket, key, e))
    })?;
    store.put(bucket, key, &body)
}

/// Reject keys that could escape a backend's namespace.
///
/// Keys are `/`-separated relative paths. Empty segments, `.`/`..` segments,
/// backslashes, and leading slashes are all refused.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }

    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }

    Ok(())
}
