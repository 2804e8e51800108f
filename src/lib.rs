//! # relmap: Relation Mapping Engine
//!
//! Declarative relation mapping over an abstract data store: describe how
//! entity types relate (HAS_ONE, BELONGS_TO, HAS_MANY, MANY_TO_MANY, deep
//! nesting, self-reference), then let the engine expand fetched records
//! with related data and propagate writes to related collections inside
//! transactions.
//!
//! The engine is store-agnostic: both halves talk to a
//! [`adapter::DataStoreAdapter`], and [`backends::MemoryAdapter`] ships as
//! an in-process implementation.

pub mod adapter;
pub mod backends;
pub mod error;
pub mod filter;
pub mod record;
pub mod relations;
pub mod sql;

#[cfg(test)]
mod tests;

// Re-export core traits and types
pub use adapter::*;
pub use error::*;
pub use filter::*;
pub use record::*;
pub use relations::*;
pub use sql::*;
