//! Exit code constants for the stepwarden CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Release validation failure
//! - 3: Storage backend failure
//! - 4: Lock contention or ambiguous lock outcome
//! - 5: Release halted or timed out
//! - 6: Workflow definition defect (parse error, unbound state)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// Release failed validation (missing fields, stale timestamp, hash mismatch).
pub const VALIDATION_FAILURE: i32 = 2;

/// The object store or lock table returned an error.
pub const STORAGE_FAILURE: i32 = 3;

/// A lock is held by someone else, or its state is unknown.
pub const LOCK_FAILURE: i32 = 4;

/// A halt flag was found or the release timed out.
pub const HALTED: i32 = 5;

/// The workflow definition or its handler wiring is broken.
pub const DEFINITION_FAILURE: i32 = 6;
