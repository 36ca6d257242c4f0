//! In-memory object store with fault injection.

use super::{ObjectStore, StoreError, StoredObject, validate_key};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Which store operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    Delete,
}

#[derive(Debug)]
struct Fault {
    error: StoreError,
    /// `None` fails forever; `Some(n)` fails the next `n` calls.
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<(String, String), StoredObject>,
    faults: HashMap<(StoreOp, String), Fault>,
}

/// Thread-safe in-memory [`ObjectStore`].
///
/// Faults are registered per key (across all buckets) and are checked before
/// the operation touches any data, so a failed put never lands.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Seed an object directly, bypassing faults.
    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        self.lock().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.to_vec(),
                last_modified: Utc::now(),
            },
        );
    }

    /// Override the last-modified timestamp of an existing object.
    pub fn set_last_modified(&self, bucket: &str, key: &str, at: DateTime<Utc>) {
        if let Some(object) = self
            .lock()
            .objects
            .get_mut(&(bucket.to_string(), key.to_string()))
        {
            object.last_modified = at;
        }
    }

    /// Whether an object exists, bypassing faults.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Read an object body as a string, bypassing faults.
    pub fn peek(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    /// Make every `op` on `key` fail with `error` until cleared.
    pub fn fail(&self, op: StoreOp, key: &str, error: StoreError) {
        self.lock().faults.insert(
            (op, key.to_string()),
            Fault {
                error,
                remaining: None,
            },
        );
    }

    /// Make the next `times` calls of `op` on `key` fail with `error`.
    pub fn fail_times(&self, op: StoreOp, key: &str, error: StoreError, times: u32) {
        self.lock().faults.insert(
            (op, key.to_string()),
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Remove all registered faults.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    fn take_fault(inner: &mut Inner, op: StoreOp, key: &str) -> Option<StoreError> {
        let slot = (op, key.to_string());
        let fault = inner.faults.get_mut(&slot)?;
        let error = fault.error.clone();

        match fault.remaining {
            None => {}
            Some(0) => {
                inner.faults.remove(&slot);
                return None;
            }
            Some(1) => {
                inner.faults.remove(&slot);
            }
            Some(n) => fault.remaining = Some(n - 1),
        }

        Some(error)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        validate_key(key)?;
        let mut inner = self.lock();
        if let Some(error) = Self::take_fault(&mut inner, StoreOp::Get, key) {
            return Err(error);
        }

        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut inner = self.lock();
        if let Some(error) = Self::take_fault(&mut inner, StoreOp::Put, key) {
            return Err(error);
        }

        inner.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.to_vec(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut inner = self.lock();
        if let Some(error) = Self::take_fault(&mut inner, StoreOp::Delete, key) {
            return Err(error);
        }

        inner.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
