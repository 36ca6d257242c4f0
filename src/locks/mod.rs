//! Lock protocol for release coordination.
//!
//! Three lock tiers protect a release (see [`crate::release`]):
//! - User lock: an operator override at `{root}/user-lock`. Any record blocks.
//! - Release lock: `{release}/lock` on the object store, scoped to one release id.
//! - Root lock: `{root}/lock` in a keyed lock table, shared by every release
//!   of a project/config pair.
//!
//! # Outcomes
//!
//! The object store has no compare-and-swap, so acquisition reports one of
//! three outcomes ([`Acquire`]):
//! - `Grabbed`: the record now names the requester
//! - `NotGrabbed`: someone else holds it, or a read failed before any write
//! - `Maybe`: a write was attempted and its outcome is unknown
//!
//! Callers must treat `Maybe` as held: attempt a release before failing, so a
//! lock is never left silently behind.
//!
//! # Backends
//!
//! Every backend implements [`Locker`]:
//! - [`ObjectLocker`]: read-then-write over any [`ObjectStore`](crate::store::ObjectStore)
//! - [`MemoryLockTable`]: mutex-guarded conditional insert
//! - [`FileLockTable`]: one file per lock, created with **create_new** semantics

mod object;
mod record;
mod table;


pub use object::{ObjectLocker, check_user_lock, clear_user_lock, set_user_lock};
pub use record::{LockRecord, UserLock};
pub use table::{FileLockTable, LockInfo, LockState, MemoryLockTable};

use crate::error::Result;
use crate::store::StoreError;

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// The lock record names the requester.
    Grabbed,

    /// The lock was not taken. `None` means another holder owns it;
    /// `Some` carries a failure that happened before anything was written.
    NotGrabbed(Option<StoreError>),

    /// Something may have been written. Assume held and release.
    Maybe(StoreError),
}

impl Acquire {
    /// Whether the caller must consider itself a (possible) holder.
    pub fn grabbed(&self) -> bool {
        !matches!(self, Acquire::NotGrabbed(_))
    }

    /// The error attached to this outcome, if any.
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Acquire::Grabbed => None,
            Acquire::NotGrabbed(err) => err.as_ref(),
            Acquire::Maybe(err) => Some(err),
        }
    }
}

/// Acquire/release capability shared by every lock backend.
///
/// `namespace` is the backend's container (a bucket or a table name);
/// `path` identifies the lock within it.
pub trait Locker: Send + Sync {
    /// Try to take the lock for `holder`.
    fn grab_lock(&self, namespace: &str, path: &str, holder: &str, reason: &str) -> Acquire;

    /// Release the lock if `holder` owns it.
    ///
    /// A missing lock is already released. A lock owned by someone else
    /// is left in place and reported as an error.
    fn release_lock(&self, namespace: &str, path: &str, holder: &str) -> Result<()>;

    /// How an operator clears the lock by hand.
    fn clear_hint(&self, namespace: &str, path: &str) -> String;
}
