//! Configuration types and defaults for stepwarden.
//!
//! This module defines enums, constants, and default value functions
//! used by the Config struct.

use serde::{Deserialize, Serialize};

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "stepwarden.yaml";

/// Default log verbosity, used when `RUST_LOG` is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The level as an `EnvFilter` directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

pub fn default_bucket_prefix() -> String {
    "stepwarden-".to_string()
}

pub fn default_lock_table() -> String {
    "stepwarden-locks".to_string()
}

pub fn default_store_root() -> String {
    ".stepwarden".to_string()
}

pub fn default_timeout_seconds() -> u64 {
    crate::release::DEFAULT_TIMEOUT_SECONDS
}

pub fn default_max_transitions() -> usize {
    crate::machine::DEFAULT_MAX_TRANSITIONS
}
