//! Object-store locks: read-then-write, no atomicity.

use super::record::{LockRecord, UserLock};
use super::{Acquire, Locker};
use crate::error::{Result, WardenError};
use crate::store::{self, ObjectStore};
use tracing::{debug, warn};

/// [`Locker`] over an [`ObjectStore`]. The namespace is the bucket.
pub struct ObjectLocker<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectLocker<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }
}

impl Locker for ObjectLocker<'_> {
    fn grab_lock(&self, bucket: &str, path: &str, holder: &str, reason: &str) -> Acquire {
        match store::get_json::<LockRecord>(self.store, bucket, path) {
            Ok(existing) if !existing.is_held_by(holder) => {
                debug!(bucket, path, holder = %existing.uuid, "lock held by another holder");
                return Acquire::NotGrabbed(None);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Acquire::NotGrabbed(Some(e)),
        }

        // Past this point a PUT is issued; a failure may still have landed.
        match store::put_json(self.store, bucket, path, &LockRecord::new(holder, reason)) {
            Ok(()) => {
                debug!(bucket, path, holder, "lock grabbed");
                Acquire::Grabbed
            }
            Err(e) => {
                warn!(bucket, path, holder, error = %e, "lock write failed, outcome unknown");
                Acquire::Maybe(e)
            }
        }
    }

    fn release_lock(&self, bucket: &str, path: &str, holder: &str) -> Result<()> {
        let existing = match store::get_json::<LockRecord>(self.store, bucket, path) {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if !existing.is_held_by(holder) {
            return Err(WardenError::LockError(format!(
                "lock at {}/{} is held by '{}', not '{}'; refusing to release it",
                bucket, path, existing.uuid, holder
            )));
        }

        self.store.delete(bucket, path)?;
        debug!(bucket, path, holder, "lock released");
        Ok(())
    }

    fn clear_hint(&self, bucket: &str, path: &str) -> String {
        self.store.removal_command(bucket, path)
    }
}

/// Fail if an operator user lock exists at `path`.
///
/// Any record blocks, whatever its content. Read failures other than
/// "not found" also block, since the lock state is unknown.
pub fn check_user_lock(store: &dyn ObjectStore, bucket: &str, path: &str) -> Result<()> {
    let object = match store.get(bucket, path) {
        Ok(object) => object,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let detail = match serde_json::from_slice::<UserLock>(&object.body) {
        Ok(lock) => format!("locked by {}: {}", lock.user, lock.lock_reason),
        Err(_) => "lock record unreadable".to_string(),
    };

    Err(WardenError::LockExistsError(format!(
        "user lock exists at {}/{} ({})",
        bucket, path, detail
    )))
}

/// Write an operator user lock, replacing any existing one.
pub fn set_user_lock(
    store: &dyn ObjectStore,
    bucket: &str,
    path: &str,
    lock: &UserLock,
) -> Result<()> {
    store::put_json(store, bucket, path, lock)?;
    Ok(())
}

/// Remove the operator user lock.
pub fn clear_user_lock(store: &dyn ObjectStore, bucket: &str, path: &str) -> Result<()> {
    store.delete(bucket, path)?;
    Ok(())
}
