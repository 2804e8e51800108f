//! Relation-mapping engine
//!
//! Declarative relation definitions ([`definition`]), their per-entity
//! storage ([`registry`]), naming defaults ([`naming`]), and the two engine
//! halves: the read-path [`resolver`] and the write-path [`mutator`].

pub mod definition;
pub mod junction;
pub mod mutator;
pub mod naming;
pub mod registry;
pub mod resolver;

pub use definition::*;
pub use mutator::*;
pub use registry::*;
pub use resolver::*;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used for deep-relation recursion
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default bound on deep-relation nesting. Cyclic `deep` configurations are
/// tolerated at registration time; recursion beyond this limit fails fast
/// with [`crate::error::RelationError::DepthExceeded`].
pub const DEFAULT_MAX_DEPTH: usize = 16;
