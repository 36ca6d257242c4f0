//! Stepwarden: declarative release workflows with lock coordination.
//!
//! A release runs through a state-machine [`machine::Definition`] of task,
//! fail and succeed states. Task handlers fail with classified errors that
//! retry and catch rules route on. Releases coordinate through a
//! three-tier lock protocol ([`locks`]) over an [`store::ObjectStore`]
//! and a keyed lock table.

pub mod cli;
pub mod commands;
pub mod config;
pub mod deployer;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod machine;
pub mod release;
pub mod store;
