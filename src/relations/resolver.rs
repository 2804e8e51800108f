//! Relation resolver (read path)
//!
//! Expands a fetched record or record set with the data of its related
//! collections, recursively for `deep` relations. "No data found" is never
//! an error here: an absent join value or an empty fetch yields empty
//! related data.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::adapter::DataStoreAdapter;
use crate::error::{RelationError, RelationResult};
use crate::filter::Filter;
use crate::record::{Record, RecordSet};
use crate::relations::definition::{NameFilter, RelationDefinition, RelationKind};
use crate::relations::junction::{self, JunctionRef};
use crate::relations::registry::RelationRegistry;
use crate::relations::{BoxFuture, DEFAULT_MAX_DEPTH};

/// Read-path engine: fetches and attaches related data
pub struct RelationResolver {
    adapter: Arc<dyn DataStoreAdapter>,
    registry: Arc<RelationRegistry>,
    max_depth: Option<usize>,
}

impl RelationResolver {
    /// Create a resolver over the given store and registry
    pub fn new(adapter: Arc<dyn DataStoreAdapter>, registry: Arc<RelationRegistry>) -> Self {
        Self {
            adapter,
            registry,
            max_depth: Some(DEFAULT_MAX_DEPTH),
        }
    }

    /// Override the deep-recursion bound; `None` removes the guard
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve the relations of a single record selected by `filter`,
    /// returning the record with related data attached.
    pub async fn resolve_one(
        &self,
        entity: &str,
        mut record: Record,
        filter: &NameFilter,
    ) -> RelationResult<Record> {
        self.resolve_into(entity, &mut record, filter, 0).await?;
        Ok(record)
    }

    /// Resolve relations for every record of a set in place, preserving
    /// order and cardinality.
    pub async fn resolve_many(
        &self,
        entity: &str,
        records: RecordSet,
        filter: &NameFilter,
    ) -> RelationResult<RecordSet> {
        if !self.registry.has_relations(entity) {
            return Ok(records);
        }
        let mut records = records;
        for record in records.iter_mut() {
            self.resolve_into(entity, record, filter, 0).await?;
        }
        Ok(records)
    }

    /// On-demand retrieval: fetch the data of a single named relation for an
    /// already-fetched record, without mutating the record. Returns `None`
    /// when no relation is registered under that mapping name.
    pub async fn fetch_related(
        &self,
        entity: &str,
        record: &Record,
        name: &str,
    ) -> RelationResult<Option<Value>> {
        for (_, definition) in self.registry.lookup(entity) {
            if definition.mapping_name == name {
                let related = self.load_relation(entity, record, &definition, 0).await?;
                return Ok(Some(related));
            }
        }
        Ok(None)
    }

    fn resolve_into<'a>(
        &'a self,
        entity: &'a str,
        record: &'a mut Record,
        filter: &'a NameFilter,
        depth: usize,
    ) -> BoxFuture<'a, RelationResult<()>> {
        Box::pin(async move {
            for (_, definition) in self.registry.lookup(entity) {
                if !filter.matches(&definition.mapping_name) {
                    continue;
                }
                debug!(
                    entity,
                    relation = %definition.mapping_name,
                    kind = ?definition.kind,
                    depth,
                    "resolving relation"
                );
                let related = self.load_relation(entity, record, &definition, depth).await?;
                attach(record, &definition, related);
            }
            Ok(())
        })
    }

    /// Fetch one relation's data for a record, deep relations included
    async fn load_relation(
        &self,
        owner: &str,
        record: &Record,
        definition: &RelationDefinition,
        depth: usize,
    ) -> RelationResult<Value> {
        match definition.kind {
            RelationKind::HasOne => {
                let owner_pk = self.adapter.primary_key_name(owner);
                let Some(join) = record.get(definition.mapping_key_or(&owner_pk)) else {
                    return Ok(Value::Null);
                };
                let column = definition.foreign_key_for(owner);
                self.find_single(definition, column, join.clone(), depth)
                    .await
            }
            RelationKind::BelongsTo => {
                let Some(join) = record.get(&definition.belongs_to_key(owner)) else {
                    return Ok(Value::Null);
                };
                let column = self.adapter.primary_key_name(&definition.target);
                self.find_single(definition, column, join.clone(), depth)
                    .await
            }
            RelationKind::HasMany => {
                let owner_pk = self.adapter.primary_key_name(owner);
                let Some(join) = record.get(definition.mapping_key_or(&owner_pk)) else {
                    return Ok(Value::Array(Vec::new()));
                };
                let filter =
                    read_filter(definition, definition.foreign_key_for(owner), join.clone());
                let set = self
                    .adapter
                    .select_many(
                        &definition.target,
                        &filter,
                        &definition.mapping_fields,
                        definition.order.as_deref(),
                        definition.limit,
                    )
                    .await?;
                self.collect_set(definition, set, depth).await
            }
            RelationKind::ManyToMany => {
                let owner_pk = self.adapter.primary_key_name(owner);
                let Some(join) = record.get(definition.mapping_key_or(&owner_pk)) else {
                    return Ok(Value::Array(Vec::new()));
                };
                let junction = JunctionRef {
                    table: definition.junction_table(owner, &self.adapter.table_prefix()),
                    owner_key: definition.foreign_key_for(owner),
                    target_key: definition.relation_foreign_key_or_default(),
                };
                let statement = junction::select_related(
                    &junction,
                    &self.adapter.table_name(&definition.target),
                    &self.adapter.primary_key_name(&definition.target),
                    join,
                    &definition.mapping_fields,
                    definition.condition.as_deref(),
                    definition.order.as_deref(),
                    definition.limit,
                );
                let set = self.adapter.raw_query(&statement).await?;
                self.collect_set(definition, set, depth).await
            }
        }
    }

    /// Single-record fetch shared by HAS_ONE and BELONGS_TO
    async fn find_single(
        &self,
        definition: &RelationDefinition,
        column: String,
        join: Value,
        depth: usize,
    ) -> RelationResult<Value> {
        let filter = read_filter(definition, column, join);
        let found = self
            .adapter
            .find(&definition.target, &filter, &definition.mapping_fields)
            .await?;
        match found {
            Some(mut related) => {
                self.descend(definition, &mut related, depth).await?;
                Ok(related.into_value())
            }
            None => Ok(Value::Null),
        }
    }

    /// Apply deep resolution to each record of a set and collect it
    async fn collect_set(
        &self,
        definition: &RelationDefinition,
        mut set: RecordSet,
        depth: usize,
    ) -> RelationResult<Value> {
        for related in set.iter_mut() {
            self.descend(definition, related, depth).await?;
        }
        Ok(Value::Array(set.into_iter().map(Record::into_value).collect()))
    }

    /// Recurse into a related record with the definition's `deep` filter
    async fn descend(
        &self,
        definition: &RelationDefinition,
        related: &mut Record,
        depth: usize,
    ) -> RelationResult<()> {
        let Some(deep) = &definition.deep else {
            return Ok(());
        };
        let next = depth + 1;
        if let Some(max_depth) = self.max_depth {
            if next > max_depth {
                return Err(RelationError::DepthExceeded {
                    entity: definition.target.clone(),
                    max_depth,
                });
            }
        }
        self.resolve_into(&definition.target, related, deep, next)
            .await
    }
}

/// Join filter for the read path: equality on the join column, ANDed with
/// the definition's extra condition when present.
fn read_filter(definition: &RelationDefinition, column: String, join: Value) -> Filter {
    let filter = Filter::eq(column, join);
    match &definition.condition {
        Some(condition) => filter.and_raw(condition.clone()),
        None => filter,
    }
}

/// Attach resolved data to the owner record: `as_fields` copies individual
/// fields for HAS_ONE / BELONGS_TO, everything else nests under the
/// mapping name.
fn attach(record: &mut Record, definition: &RelationDefinition, related: Value) {
    match &definition.as_fields {
        Some(as_fields) if definition.kind.supports_as_fields() => {
            for field in as_fields {
                let value = related.get(&field.source).cloned().unwrap_or(Value::Null);
                record.set(field.target_name().to_string(), value);
            }
        }
        _ => record.set(definition.mapping_name.clone(), related),
    }
}
