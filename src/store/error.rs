//! Storage error type shared by every object store backend.

use thiserror::Error;

/// Errors that can occur when reading or writing objects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// The bucket that was searched.
        bucket: String,
        /// The key of the object that was not found.
        key: String,
    },

    /// A conditional write was rejected because the object already exists.
    #[error("precondition failed for {key}: {detail}")]
    PreconditionFailed {
        /// The key the conditional write targeted.
        key: String,
        /// What the existing object held.
        detail: String,
    },

    /// The bucket or key cannot be mapped onto the backend safely.
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    /// An object body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all for backend failures (I/O, network, permissions).
    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub(crate) fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}
