//! Release-level lock acquisition.
//!
//! [`Release::grab_locks`] takes the three tiers in order: user lock
//! check, release lock, root lock. Each [`Acquire`] outcome maps to an
//! error the deploy workflow routes on:
//! - not grabbed: `LockExistsError`, nothing to clean up
//! - maybe grabbed: `LockError`, the caller must try to release

use super::Release;
use crate::error::{Result, WardenError};
use crate::locks::{self, Acquire, Locker, ObjectLocker};
use crate::store::ObjectStore;
use tracing::{info, instrument};

fn interpret(outcome: Acquire, describe: impl FnOnce() -> String) -> Result<()> {
    match outcome {
        Acquire::Grabbed => Ok(()),
        // Checked before the error: some failures happen before anything is written.
        Acquire::NotGrabbed(Some(e)) => Err(WardenError::LockExistsError(e.to_string())),
        Acquire::NotGrabbed(None) => Err(WardenError::LockExistsError(describe())),
        Acquire::Maybe(e) => Err(WardenError::LockError(e.to_string())),
    }
}

impl Release {
    /// Take the user, release and root locks, in that order.
    #[instrument(skip_all, fields(release_id = ?self.release_id, uuid = ?self.uuid))]
    pub fn grab_locks(
        &self,
        store: &dyn ObjectStore,
        locker: &dyn Locker,
        lock_table: &str,
    ) -> Result<()> {
        self.check_user_lock(store)?;
        self.grab_release_lock(store)?;
        self.grab_root_lock(locker, lock_table)?;
        info!("locks grabbed");
        Ok(())
    }

    /// Fail with `LockExistsError` if an operator holds the user lock.
    pub fn check_user_lock(&self, store: &dyn ObjectStore) -> Result<()> {
        let paths = self.config_paths()?;
        locks::check_user_lock(store, self.bucket()?, &paths.user_lock)
            .map_err(|e| WardenError::LockExistsError(format!("CheckUserLock error: {}", e)))
    }

    /// Take the object-store lock scoped to this release id.
    pub fn grab_release_lock(&self, store: &dyn ObjectStore) -> Result<()> {
        let paths = self.paths()?;
        let bucket = self.bucket()?;
        let locker = ObjectLocker::new(store);

        let outcome = locker.grab_lock(bucket, &paths.release_lock, self.holder()?, "");
        interpret(outcome, || {
            format!(
                "Lock Already Exists at {}:{}\nRun the following to clear it: {}",
                bucket,
                paths.release_lock,
                locker.clear_hint(bucket, &paths.release_lock)
            )
        })
    }

    /// Take the keyed-table lock shared by every release of this config.
    pub fn grab_root_lock(&self, locker: &dyn Locker, lock_table: &str) -> Result<()> {
        let paths = self.config_paths()?;

        let outcome = locker.grab_lock(lock_table, &paths.root_lock, self.holder()?, "");
        interpret(outcome, || {
            format!(
                "Lock Already Exists at {}:{}\nRun the following to clear it: {}",
                lock_table,
                paths.root_lock,
                locker.clear_hint(lock_table, &paths.root_lock)
            )
        })
    }

    /// Release the root lock if this execution holds it.
    ///
    /// The release lock stays, so this release id cannot be deployed again.
    pub fn unlock_root(&self, locker: &dyn Locker, lock_table: &str) -> Result<()> {
        let paths = self.config_paths()?;
        locker.release_lock(lock_table, &paths.root_lock, self.holder()?)?;
        info!(path = %paths.root_lock, "root lock released");
        Ok(())
    }
}
