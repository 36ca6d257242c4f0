//! Filesystem utilities backing the on-disk store and lock table.

pub mod atomic;

pub use atomic::atomic_write;
