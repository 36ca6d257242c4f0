//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for stepwarden.
///
/// This struct represents the contents of `stepwarden.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Release settings
    // =========================================================================
    /// Prefix of the default release bucket; the account id is appended.
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,

    /// Release timeout in seconds when a release does not set one.
    #[serde(default = "default_timeout_seconds")]
    pub default_timeout_seconds: u64,

    /// Region releases default to. Overridden by `STEPWARDEN_REGION`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Account releases default to. Overridden by `STEPWARDEN_ACCOUNT_ID`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    // =========================================================================
    // Storage settings
    // =========================================================================
    /// Directory holding the object store and lock table.
    #[serde(default = "default_store_root")]
    pub store_root: String,

    /// Name of the keyed lock table holding root locks.
    #[serde(default = "default_lock_table")]
    pub lock_table: String,

    // =========================================================================
    // Engine settings
    // =========================================================================
    /// Cap on state entries per workflow run.
    #[serde(default = "default_max_transitions")]
    pub max_transitions: usize,

    /// Log level used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_prefix: default_bucket_prefix(),
            default_timeout_seconds: default_timeout_seconds(),
            region: None,
            account_id: None,
            store_root: default_store_root(),
            lock_table: default_lock_table(),
            max_transitions: default_max_transitions(),
            log_level: LogLevel::default(),
        }
    }
}
