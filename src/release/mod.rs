//! The release entity threaded through the deploy workflow.
//!
//! A [`Release`] identifies one deployment attempt (account, project,
//! config, release id) and carries its progress. Clients fill the
//! identifying fields; the server owns `uuid`, `started_at` and `success`
//! and regenerates them at workflow entry.
//!
//! Storage layout, relative to the release bucket:
//!
//! ```text
//! {account}/{project}/_shared/...
//! {account}/{project}/{config}/lock        root lock (keyed table)
//! {account}/{project}/{config}/user-lock   operator override
//! {account}/{project}/{config}/halt        halt flag
//! {account}/{project}/{config}/{release_id}/release
//! {account}/{project}/{config}/{release_id}/lock
//! {account}/{project}/{config}/{release_id}/log
//! ```

mod halt;
mod lock;
mod log;
mod paths;
mod validate;


pub use paths::ReleasePaths;

use crate::error::{Result, WardenError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Timeout applied when a release does not set one.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// Terminal error recorded by a catch rule (`{"Error": ..., "Cause": ...}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseError {
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(rename = "Cause", default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// One deployment attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Release {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,

    /// Hash of the request as received; compared against the uploaded copy.
    #[serde(skip)]
    pub release_sha256: String,

    /// Execution id, generated by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Release id, generated by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,

    /// Bucket holding the release's objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds the release may run before it halts itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Informational only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReleaseError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl Release {
    /// `"Release(<id>) Error:"`, or `"Release Error:"` without an id.
    pub fn error_prefix(&self) -> String {
        match &self.release_id {
            Some(id) => format!("Release({}) Error:", id),
            None => "Release Error:".to_string(),
        }
    }

    /// `deploy-<project>-<config>-`, with `/` in the project replaced by `-`.
    pub fn execution_prefix(&self) -> String {
        format!(
            "deploy-{}-{}-",
            self.project_name.as_deref().unwrap_or_default().replace('/', "-"),
            self.config_name.as_deref().unwrap_or_default()
        )
    }

    /// A fresh, time-ordered execution name.
    pub fn execution_name(&self) -> String {
        time_uuid(&self.execution_prefix())
    }

    /// The configured bucket.
    pub fn bucket(&self) -> Result<&str> {
        non_blank(&self.bucket)
            .ok_or_else(|| WardenError::ValidationError("bucket must be defined".to_string()))
    }

    /// The execution id that holds this release's locks.
    pub fn holder(&self) -> Result<&str> {
        non_blank(&self.uuid)
            .ok_or_else(|| WardenError::ValidationError("uuid must be set by server".to_string()))
    }

    /// SHA-256 of this release's JSON encoding.
    pub fn content_sha256(&self) -> Result<String> {
        sha256_json(self)
    }
}

/// `prefix` followed by a time-ordered unique id.
pub fn time_uuid(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::now_v7())
}

/// Hex SHA-256 of a value's JSON encoding.
pub fn sha256_json<T: Serialize>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| {
        WardenError::ValidationError(format!("failed to encode release for hashing: {}", e))
    })?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Whether `t` lies strictly between `now - past` and `now + future`.
pub fn within_time_frame(
    t: DateTime<Utc>,
    past: Duration,
    future: Duration,
    now: DateTime<Utc>,
) -> bool {
    t > now - past && t < now + future
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
