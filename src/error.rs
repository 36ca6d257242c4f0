//! Error types for stepwarden.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Each variant maps to an exit code for the CLI and to an [`ErrorKind`] that
//! workflow retry/catch rules match against.

use crate::exit_codes;
use crate::machine::ErrorKind;
use crate::store::StoreError;
use thiserror::Error;

/// Main error type for stepwarden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The release payload or its uploaded artifact failed validation.
    /// Nothing was mutated, so the failure is clean.
    #[error("{0}")]
    ValidationError(String),

    /// Someone else holds a lock. Nothing was mutated; safe to retry later.
    #[error("{0}")]
    LockExistsError(String),

    /// A lock mutation may or may not have landed. The caller must attempt
    /// a compensating release before failing.
    #[error("{0}")]
    LockError(String),

    /// The release was halted by an operator or ran past its timeout.
    #[error("{0}")]
    HaltError(String),

    /// The workflow definition is malformed.
    #[error("invalid workflow definition: {0}")]
    ParseError(String),

    /// A task state has no handler registered for it.
    #[error("state '{0}' has no registered handler")]
    UnboundStateError(String),

    /// The object store or lock table failed.
    #[error(transparent)]
    StorageError(#[from] StoreError),
}

impl WardenError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::UserError(_) => exit_codes::USER_ERROR,
            WardenError::ValidationError(_) => exit_codes::VALIDATION_FAILURE,
            WardenError::LockExistsError(_) | WardenError::LockError(_) => {
                exit_codes::LOCK_FAILURE
            }
            WardenError::HaltError(_) => exit_codes::HALTED,
            WardenError::ParseError(_) | WardenError::UnboundStateError(_) => {
                exit_codes::DEFINITION_FAILURE
            }
            WardenError::StorageError(_) => exit_codes::STORAGE_FAILURE,
        }
    }

    /// The error kind that retry and catch rules match this error by.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::UserError(_) => ErrorKind::Named("UserError".to_string()),
            WardenError::ValidationError(_) => ErrorKind::Validation,
            WardenError::LockExistsError(_) => ErrorKind::LockExists,
            WardenError::LockError(_) => ErrorKind::Lock,
            WardenError::HaltError(_) => ErrorKind::Halt,
            WardenError::ParseError(_) => ErrorKind::Parse,
            WardenError::UnboundStateError(_) => ErrorKind::UnboundState,
            WardenError::StorageError(_) => ErrorKind::Storage,
        }
    }
}

/// Result type alias for stepwarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
