//! Release validation and server-side defaults.

use super::{
    DEFAULT_TIMEOUT_SECONDS, Release, non_blank, sha256_json, time_uuid, within_time_frame,
};
use crate::error::{Result, WardenError};
use crate::store::{self, ObjectStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// How far back `created_at` may lie; old releases can still be rolled back to.
pub const CREATED_AT_MAX_AGE_DAYS: i64 = 10;

/// Clock skew tolerated for `created_at`.
pub const CREATED_AT_MAX_SKEW_MINUTES: i64 = 2;

fn missing(message: &str) -> WardenError {
    WardenError::ValidationError(message.to_string())
}

impl Release {
    /// Clear the fields the server owns so a client cannot forge them.
    pub fn wipe_controlled_values(&mut self) {
        self.uuid = None;
        self.started_at = None;
        self.success = None;
    }

    /// Fill unset fields. Never overwrites a value the caller supplied.
    ///
    /// The default bucket is `bucket_prefix + account` of the executing
    /// environment, not of the release.
    pub fn set_defaults(&mut self, region: Option<&str>, account: Option<&str>, bucket_prefix: &str) {
        if non_blank(&self.uuid).is_none() {
            self.uuid = Some(time_uuid("release-"));
        }

        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }

        if non_blank(&self.aws_region).is_none() {
            self.aws_region = region.map(str::to_string);
        }

        if non_blank(&self.aws_account_id).is_none() {
            self.aws_account_id = account.map(str::to_string);
        }

        if non_blank(&self.bucket).is_none()
            && let Some(account) = account.filter(|a| !a.is_empty())
        {
            self.bucket = Some(format!("{}{}", bucket_prefix, account));
        }

        if self.timeout.is_none() {
            self.timeout = Some(DEFAULT_TIMEOUT_SECONDS);
        }
    }

    /// Check required fields, the `created_at` window and the uploaded
    /// release hash, reporting the first failure.
    ///
    /// The uploaded copy at `{release_dir}/release` is decoded as `T` and
    /// hashed; it must match `release_sha256`.
    pub fn validate<T>(&self, store: &dyn ObjectStore) -> Result<()>
    where
        T: DeserializeOwned + Serialize,
    {
        self.validate_at::<T>(store, Utc::now())
    }

    pub fn validate_at<T>(&self, store: &dyn ObjectStore, now: DateTime<Utc>) -> Result<()>
    where
        T: DeserializeOwned + Serialize,
    {
        self.validate_fields(now)?;
        self.validate_release_sha::<T>(store)
    }

    /// Field and time-window checks, in a fixed order.
    pub fn validate_fields(&self, now: DateTime<Utc>) -> Result<()> {
        if non_blank(&self.aws_account_id).is_none() {
            return Err(missing("aws_account_id must be defined"));
        }
        if non_blank(&self.aws_region).is_none() {
            return Err(missing("aws_region must be defined"));
        }
        if non_blank(&self.uuid).is_none() {
            return Err(missing("uuid must be set by server"));
        }
        if non_blank(&self.release_id).is_none() {
            return Err(missing("release_id must be defined"));
        }
        if non_blank(&self.project_name).is_none() {
            return Err(missing("project_name must be defined"));
        }
        if non_blank(&self.config_name).is_none() {
            return Err(missing("config_name must be defined"));
        }
        if non_blank(&self.bucket).is_none() {
            return Err(missing("bucket must be defined"));
        }
        if self.timeout.is_none() {
            return Err(missing("timeout must be defined"));
        }
        let Some(created_at) = self.created_at else {
            return Err(missing("created_at must be defined"));
        };
        if self.started_at.is_none() {
            return Err(missing("started_at must be defined"));
        }

        if !within_time_frame(
            created_at,
            Duration::days(CREATED_AT_MAX_AGE_DAYS),
            Duration::minutes(CREATED_AT_MAX_SKEW_MINUTES),
            now,
        ) {
            return Err(missing("created_at older than 10 days (or in the future)"));
        }

        Ok(())
    }

    fn validate_release_sha<T>(&self, store: &dyn ObjectStore) -> Result<()>
    where
        T: DeserializeOwned + Serialize,
    {
        let paths = self.paths()?;
        let uploaded: T = store::get_json(store, self.bucket()?, &paths.release).map_err(|e| {
            WardenError::ValidationError(format!("error unmarshalling uploaded release: {}", e))
        })?;

        let expected = sha256_json(&uploaded)?;
        if expected != self.release_sha256 {
            return Err(WardenError::ValidationError(format!(
                "release SHA incorrect: expected {}, got {}",
                expected, self.release_sha256
            )));
        }
        Ok(())
    }
}
