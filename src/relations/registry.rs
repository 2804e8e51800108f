//! Relation registry
//!
//! Thread-safe storage for the relation definitions of each entity type.
//! Lookup order is insertion order and determines resolution order when
//! multiple relations match the same name filter.

use dashmap::DashMap;
use tracing::debug;

use crate::error::{RelationError, RelationResult};
use crate::relations::definition::{RelationConfig, RelationDefinition};

/// Per-entity, insertion-ordered sets of named relation definitions
#[derive(Debug, Default)]
pub struct RelationRegistry {
    relations: DashMap<String, Vec<(String, RelationDefinition)>>,
}

impl RelationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation definition under a name for an entity type.
    ///
    /// The definition's `mapping_name` defaults to the registration name.
    /// No two definitions may share a name for the same entity type.
    pub fn register(
        &self,
        entity: &str,
        name: &str,
        mut definition: RelationDefinition,
    ) -> RelationResult<()> {
        if definition.mapping_name.is_empty() {
            definition.mapping_name = name.to_string();
        }
        definition.validate()?;

        let mut entry = self.relations.entry(entity.to_string()).or_default();
        if entry.iter().any(|(existing, _)| existing == name) {
            return Err(RelationError::Configuration(format!(
                "relation '{name}' is already registered for entity '{entity}'"
            )));
        }
        debug!(entity, relation = name, kind = ?definition.kind, "registering relation");
        entry.push((name.to_string(), definition));
        Ok(())
    }

    /// Register from the declarative configuration surface
    pub fn register_config(
        &self,
        entity: &str,
        name: &str,
        config: RelationConfig,
    ) -> RelationResult<()> {
        let definition = RelationDefinition::from_config(name, config)?;
        self.register(entity, name, definition)
    }

    /// All definitions for an entity type, in registration order
    pub fn lookup(&self, entity: &str) -> Vec<(String, RelationDefinition)> {
        self.relations
            .get(entity)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// True when the entity type has any registered relations
    pub fn has_relations(&self, entity: &str) -> bool {
        self.relations
            .get(entity)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    /// True when the entity has a relation registered under the given name
    pub fn has_relation(&self, entity: &str, name: &str) -> bool {
        self.relations
            .get(entity)
            .map(|entry| entry.iter().any(|(existing, _)| existing == name))
            .unwrap_or(false)
    }

    /// Registration names for an entity type, in order
    pub fn names(&self, entity: &str) -> Vec<String> {
        self.relations
            .get(entity)
            .map(|entry| entry.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of registered definitions across all entity types
    pub fn relation_count(&self) -> usize {
        self.relations.iter().map(|entry| entry.value().len()).sum()
    }

    /// Remove all registered definitions
    pub fn clear(&self) {
        self.relations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::definition::RelationKind;

    #[test]
    fn test_register_and_lookup() {
        let registry = RelationRegistry::new();
        registry
            .register("Order", "items", RelationDefinition::has_many("OrderItem"))
            .unwrap();

        assert!(registry.has_relations("Order"));
        assert!(registry.has_relation("Order", "items"));
        assert!(!registry.has_relation("Order", "tags"));

        let defs = registry.lookup("Order");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].0, "items");
        assert_eq!(defs[0].1.mapping_name, "items");
        assert_eq!(defs[0].1.kind, RelationKind::HasMany);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = RelationRegistry::new();
        registry
            .register("Order", "items", RelationDefinition::has_many("OrderItem"))
            .unwrap();
        let err = registry
            .register("Order", "items", RelationDefinition::has_many("OrderItem"))
            .unwrap_err();
        assert!(matches!(err, RelationError::Configuration(_)));

        // Same name on a different entity is fine.
        registry
            .register("Invoice", "items", RelationDefinition::has_many("InvoiceItem"))
            .unwrap();
        assert_eq!(registry.relation_count(), 2);
    }

    #[test]
    fn test_lookup_preserves_insertion_order() {
        let registry = RelationRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register("Order", name, RelationDefinition::has_many("OrderItem"))
                .unwrap();
        }
        let names: Vec<String> = registry
            .lookup("Order")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.names("Order"), names);
    }

    #[test]
    fn test_register_validates_definition() {
        let registry = RelationRegistry::new();
        let def = RelationDefinition::has_many("OrderItem").with_relation_table("junk");
        assert!(registry.register("Order", "items", def).is_err());
        assert!(!registry.has_relations("Order"));
    }

    #[test]
    fn test_unknown_entity_is_empty() {
        let registry = RelationRegistry::new();
        assert!(registry.lookup("Ghost").is_empty());
        assert!(!registry.has_relations("Ghost"));
        assert!(registry.names("Ghost").is_empty());
    }

    #[test]
    fn test_clear() {
        let registry = RelationRegistry::new();
        registry
            .register("Order", "items", RelationDefinition::has_many("OrderItem"))
            .unwrap();
        registry.clear();
        assert_eq!(registry.relation_count(), 0);
    }
}
