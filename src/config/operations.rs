//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{Result, WardenError};
use std::path::{Path, PathBuf};

/// Overrides `region`.
pub const ENV_REGION: &str = "STEPWARDEN_REGION";

/// Overrides `account_id`.
pub const ENV_ACCOUNT_ID: &str = "STEPWARDEN_ACCOUNT_ID";

/// Directory under `store_root` holding the file lock table.
const LOCKS_DIR: &str = "_locks";

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(WardenError::UserError)` - Read or parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            WardenError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from `path` if it exists, defaults otherwise, then apply
    /// environment overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| {
                WardenError::UserError(format!("failed to parse config YAML: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            WardenError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Replace `region` and `account_id` with their environment overrides,
    /// when set and non-empty.
    pub fn apply_env(&mut self) {
        if let Some(region) = env_value(ENV_REGION) {
            self.region = Some(region);
        }
        if let Some(account) = env_value(ENV_ACCOUNT_ID) {
            self.account_id = Some(account);
        }
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `default_timeout_seconds` must be positive
    /// - `max_transitions` must be positive
    /// - `lock_table` must be non-empty
    /// - `bucket_prefix` must not contain '/'
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_seconds == 0 {
            return Err(WardenError::UserError(
                "config validation failed: default_timeout_seconds must be greater than 0"
                    .to_string(),
            ));
        }

        if self.max_transitions == 0 {
            return Err(WardenError::UserError(
                "config validation failed: max_transitions must be greater than 0".to_string(),
            ));
        }

        if self.lock_table.is_empty() {
            return Err(WardenError::UserError(
                "config validation failed: lock_table must be non-empty".to_string(),
            ));
        }

        if self.bucket_prefix.contains('/') {
            return Err(WardenError::UserError(format!(
                "config validation failed: bucket_prefix must not contain '/' (found '{}')",
                self.bucket_prefix
            )));
        }

        Ok(())
    }

    /// Root of the filesystem object store.
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store_root)
    }

    /// Root of the file lock table.
    pub fn locks_path(&self) -> PathBuf {
        self.store_path().join(LOCKS_DIR)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
