//! Cooperative cancellation: timeouts and the operator halt flag.
//!
//! A halt flag is honoured only while it is fresh, so a forgotten flag
//! does not block every later release of the same config.

use super::{DEFAULT_TIMEOUT_SECONDS, Release, within_time_frame};
use crate::error::{Result, WardenError};
use crate::store::{self, ObjectStore};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Minutes a halt flag stays effective after it is written.
pub const HALT_MAX_AGE_MINUTES: i64 = 5;

/// Clock skew tolerated for the halt flag's timestamp.
pub const HALT_MAX_SKEW_MINUTES: i64 = 2;

/// Message used when the halt flag has an empty body.
pub const DEFAULT_HALT_MESSAGE: &str = "Halt File Found";

impl Release {
    /// `HaltError` once `started_at + timeout` has passed.
    ///
    /// Stamps `started_at` with the current time if it is unset.
    pub fn timed_out(&mut self) -> Result<()> {
        self.timed_out_at(Utc::now())
    }

    pub fn timed_out_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        let started_at = *self.started_at.get_or_insert(now);
        let seconds = self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        let deadline = i64::try_from(seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|timeout| started_at.checked_add_signed(timeout));

        match deadline {
            Some(deadline) if now > deadline => {
                Err(WardenError::HaltError("Timeout: Halting Release".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// `HaltError` if the release timed out or a fresh halt flag exists.
    pub fn is_halted(&mut self, store: &dyn ObjectStore) -> Result<()> {
        self.is_halted_at(store, Utc::now())
    }

    pub fn is_halted_at(&mut self, store: &dyn ObjectStore, now: DateTime<Utc>) -> Result<()> {
        self.timed_out_at(now)?;

        if let Some(message) = self.halt_flag(store, now) {
            info!(release_id = ?self.release_id, %message, "halt flag found");
            return Err(WardenError::HaltError(message));
        }
        Ok(())
    }

    /// Write the halt flag for this release's config.
    pub fn halt(&self, store: &dyn ObjectStore, message: &str) -> Result<()> {
        let paths = self.config_paths()?;
        store::put_string(store, self.bucket()?, &paths.halt, message)?;
        info!(path = %paths.halt, "halt flag written");
        Ok(())
    }

    /// Delete the halt flag. Failures are logged and ignored.
    pub fn remove_halt(&self, store: &dyn ObjectStore) {
        let removed = self
            .config_paths()
            .and_then(|paths| Ok(store.delete(self.bucket()?, &paths.halt)?));
        if let Err(e) = removed {
            warn!(error = %e, "remove_halt: error ignored");
        }
    }

    /// The flag's message, if a fresh flag exists. Any read failure
    /// counts as no flag.
    fn halt_flag(&self, store: &dyn ObjectStore, now: DateTime<Utc>) -> Option<String> {
        let paths = self.config_paths().ok()?;
        let object = store.get(self.bucket().ok()?, &paths.halt).ok()?;

        if !within_time_frame(
            object.last_modified,
            Duration::minutes(HALT_MAX_AGE_MINUTES),
            Duration::minutes(HALT_MAX_SKEW_MINUTES),
            now,
        ) {
            return None;
        }

        let message = String::from_utf8_lossy(&object.body).into_owned();
        if message.is_empty() {
            Some(DEFAULT_HALT_MESSAGE.to_string())
        } else {
            Some(message)
        }
    }
}
