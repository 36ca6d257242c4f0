//! Error kinds and the patterns retry/catch rules match them with.
//!
//! Kinds compare by name, so `ErrorKind::Lock` and
//! `ErrorKind::Named("LockError".into())` are the same kind.

use crate::error::WardenError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Wildcard accepted in any `ErrorEquals` list.
pub const MATCH_ALL: &str = "States.ALL";

/// A matchable error tag.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorKind {
    Validation,
    LockExists,
    Lock,
    Halt,
    Parse,
    UnboundState,
    Storage,
    /// A handler could not decode its input.
    Unmarshal,
    /// A handler panicked.
    Panic,
    /// Any other tag, typically a business error from a handler.
    Named(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::LockExists => "LockExistsError",
            ErrorKind::Lock => "LockError",
            ErrorKind::Halt => "HaltError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::UnboundState => "UnboundStateError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Unmarshal => "UnmarshalError",
            ErrorKind::Panic => "PanicError",
            ErrorKind::Named(name) => name,
        }
    }

    pub fn named(name: &str) -> Self {
        Self::from(name)
    }
}

impl From<&str> for ErrorKind {
    fn from(name: &str) -> Self {
        match name {
            "ValidationError" => ErrorKind::Validation,
            "LockExistsError" => ErrorKind::LockExists,
            "LockError" => ErrorKind::Lock,
            "HaltError" => ErrorKind::Halt,
            "ParseError" => ErrorKind::Parse,
            "UnboundStateError" => ErrorKind::UnboundState,
            "StorageError" => ErrorKind::Storage,
            "UnmarshalError" => ErrorKind::Unmarshal,
            "PanicError" => ErrorKind::Panic,
            other => ErrorKind::Named(other.to_string()),
        }
    }
}

impl From<String> for ErrorKind {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Hash for ErrorKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an `ErrorEquals` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorPattern {
    /// `States.ALL` or `*`.
    All,
    Kind(ErrorKind),
}

impl ErrorPattern {
    pub fn matches(&self, kind: &ErrorKind) -> bool {
        match self {
            ErrorPattern::All => true,
            ErrorPattern::Kind(expected) => expected == kind,
        }
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPattern::All => f.write_str(MATCH_ALL),
            ErrorPattern::Kind(kind) => f.write_str(kind.as_str()),
        }
    }
}

impl From<&str> for ErrorPattern {
    fn from(pattern: &str) -> Self {
        match pattern {
            MATCH_ALL | "*" => ErrorPattern::All,
            name => ErrorPattern::Kind(ErrorKind::from(name)),
        }
    }
}

impl From<String> for ErrorPattern {
    fn from(pattern: String) -> Self {
        Self::from(pattern.as_str())
    }
}

impl From<ErrorPattern> for String {
    fn from(pattern: ErrorPattern) -> Self {
        match pattern {
            ErrorPattern::All => MATCH_ALL.to_string(),
            ErrorPattern::Kind(kind) => kind.into(),
        }
    }
}

/// A classified handler failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {cause}")]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub cause: String,
}

impl TaskFailure {
    pub fn new(kind: impl Into<ErrorKind>, cause: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            cause: cause.into(),
        }
    }

    /// The `{"Error": ..., "Cause": ...}` object written by catch rules.
    pub fn to_value(&self) -> Value {
        json!({
            "Error": self.kind.as_str(),
            "Cause": self.cause,
        })
    }
}

impl From<WardenError> for TaskFailure {
    fn from(err: WardenError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.to_string(),
        }
    }
}

/// The error a failed run reports to its caller. Kinds without a
/// matching variant keep their name in the message.
impl From<TaskFailure> for WardenError {
    fn from(failure: TaskFailure) -> Self {
        let TaskFailure { kind, cause } = failure;
        match kind {
            ErrorKind::Validation => WardenError::ValidationError(cause),
            ErrorKind::LockExists => WardenError::LockExistsError(cause),
            ErrorKind::Lock => WardenError::LockError(cause),
            ErrorKind::Halt => WardenError::HaltError(cause),
            ErrorKind::Storage => WardenError::StorageError(StoreError::Backend(cause)),
            other => WardenError::UserError(format!("{}: {}", other, cause)),
        }
    }
}
