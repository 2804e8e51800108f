//! Engine-level scenario tests
//!
//! Read-path and write-path scenarios running the full engine against the
//! in-memory backend. Unit tests for individual modules live next to the
//! modules themselves.


use std::sync::Arc;

use crate::backends::MemoryAdapter;
use crate::relations::{RelationMutator, RelationRegistry, RelationResolver};

/// Shared fixture: one store, one registry, engines on demand
pub(crate) struct Harness {
    pub store: Arc<MemoryAdapter>,
    pub registry: Arc<RelationRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            store: Arc::new(MemoryAdapter::with_prefix(prefix)),
            registry: Arc::new(RelationRegistry::new()),
        }
    }

    pub fn resolver(&self) -> RelationResolver {
        RelationResolver::new(self.store.clone(), self.registry.clone())
    }

    pub fn mutator(&self) -> RelationMutator {
        RelationMutator::new(self.store.clone(), self.registry.clone())
    }
}
