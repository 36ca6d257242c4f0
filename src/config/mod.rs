//! Configuration model for stepwarden.
//!
//! This module defines the Config struct that represents `stepwarden.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, validation of config values, and
//! environment overrides for the account and region a deployer runs in.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::{ENV_ACCOUNT_ID, ENV_REGION};
pub use types::{DEFAULT_CONFIG_PATH, LogLevel};
