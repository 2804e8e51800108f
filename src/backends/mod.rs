//! Data store backends
//!
//! The engine only depends on the [`crate::adapter::DataStoreAdapter`]
//! trait; this module holds concrete implementations shipped with the
//! crate.

pub mod memory;

pub use memory::*;
