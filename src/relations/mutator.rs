//! Relation mutator (write path)
//!
//! Propagates a create/update/delete operation on a record to its related
//! collections. Multi-row mutations (HAS_MANY batches, MANY_TO_MANY
//! junction rewrites) run inside adapter transactions; a failure inside the
//! batch rolls back before the error is surfaced. Sibling relations
//! processed in the same call each manage their own transaction.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::DataStoreAdapter;
use crate::error::{RelationError, RelationResult};
use crate::filter::Filter;
use crate::record::{Fields, Record};
use crate::relations::definition::{NameFilter, RelationDefinition, RelationKind};
use crate::relations::junction::{self, JunctionRef};
use crate::relations::registry::RelationRegistry;
use crate::relations::{BoxFuture, DEFAULT_MAX_DEPTH};

/// The operation propagated to related collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationOp {
    /// Insert related data after the owner was created
    Add,
    /// Update related data after the owner was saved
    Save,
    /// Delete related data after the owner was removed
    Del,
}

impl RelationOp {
    /// Lowercase operation name, for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Save => "save",
            Self::Del => "del",
        }
    }
}

/// Write-path engine: propagates an operation to related collections
pub struct RelationMutator {
    adapter: Arc<dyn DataStoreAdapter>,
    registry: Arc<RelationRegistry>,
    max_depth: Option<usize>,
}

impl RelationMutator {
    /// Create a mutator over the given store and registry
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

    /// Propagate `op` from the owner record to every relation selected by
    /// `filter`. The record must be a mapping; anything else fails
    /// immediately without contacting the store. Returns the outcome of the
    /// last mutation step executed (`false` when nothing matched).
    pub async fn apply_relation(
        &self,
        op: RelationOp,
        entity: &str,
        record: &Value,
        filter: &NameFilter,
    ) -> RelationResult<bool> {
        let Some(data) = record.as_object() else {
            return Err(RelationError::InvalidInput(format!(
                "relation {} on '{entity}' requires a record mapping",
                op.as_str()
            )));
        };
        self.apply_inner(op, entity, data, filter, 0).await
    }

    /// Convenience wrapper taking a [`Record`]
    pub async fn apply_record(
        &self,
        op: RelationOp,
        entity: &str,
        record: &Record,
        filter: &NameFilter,
    ) -> RelationResult<bool> {
        self.apply_inner(op, entity, record.fields(), filter, 0).await
    }

    fn apply_inner<'a>(
        &'a self,
        op: RelationOp,
        entity: &'a str,
        data: &'a Fields,
        filter: &'a NameFilter,
        depth: usize,
    ) -> BoxFuture<'a, RelationResult<bool>> {
        Box::pin(async move {
            let mut outcome = false;
            for (_, definition) in self.registry.lookup(entity) {
                if !filter.matches(&definition.mapping_name) {
                    continue;
                }
                let owner_pk = self.adapter.primary_key_name(entity);
                let join = data
                    .get(definition.mapping_key_or(&owner_pk))
                    .cloned()
                    .unwrap_or(Value::Null);
                let payload = data.get(&definition.mapping_name);
                if !payload_present(payload) && op != RelationOp::Del {
                    continue;
                }
                debug!(
                    entity,
                    relation = %definition.mapping_name,
                    op = op.as_str(),
                    depth,
                    "applying relation mutation"
                );
                if let Some(step) = self
                    .apply_one(op, entity, &definition, &join, payload, depth)
                    .await?
                {
                    outcome = step;
                }
            }
            Ok(outcome)
        })
    }

    /// Run the kind-specific mutation, then propagate deep relations.
    /// Returns `None` when the kind executes no mutation step, so a no-op
    /// relation never masks a sibling's outcome.
    async fn apply_one(
        &self,
        op: RelationOp,
        owner: &str,
        definition: &RelationDefinition,
        join: &Value,
        payload: Option<&Value>,
        depth: usize,
    ) -> RelationResult<Option<bool>> {
        let outcome = match definition.kind {
            RelationKind::HasOne => {
                Some(self.apply_has_one(op, owner, definition, join, payload).await?)
            }
            // The owner holds the foreign key; there is nothing to write on
            // the related side and no step outcome to report.
            RelationKind::BelongsTo => None,
            RelationKind::HasMany => Some(
                self.apply_has_many(op, owner, definition, join, payload)
                    .await?,
            ),
            RelationKind::ManyToMany => Some(
                self.apply_many_to_many(op, owner, definition, join, payload)
                    .await?,
            ),
        };
        if let Some(payload) = payload {
            self.descend(op, definition, payload, depth).await?;
        }
        Ok(outcome)
    }

    async fn apply_has_one(
        &self,
        op: RelationOp,
        owner: &str,
        definition: &RelationDefinition,
        join: &Value,
        payload: Option<&Value>,
    ) -> RelationResult<bool> {
        match op {
            RelationOp::Add => {
                let mut related = record_payload(definition, payload)?;
                related.set(definition.foreign_key_for(owner), join.clone());
                self.adapter.insert(&definition.target, &related).await?;
                Ok(true)
            }
            RelationOp::Save => {
                let related = record_payload(definition, payload)?;
                let filter = write_filter(definition, owner, join);
                let affected = self
                    .adapter
                    .update(&definition.target, &filter, &related)
                    .await?;
                Ok(affected > 0)
            }
            RelationOp::Del => {
                let filter = write_filter(definition, owner, join);
                let affected = self.adapter.delete(&definition.target, &filter).await?;
                Ok(affected > 0)
            }
        }
    }

    async fn apply_has_many(
        &self,
        op: RelationOp,
        owner: &str,
        definition: &RelationDefinition,
        join: &Value,
        payload: Option<&Value>,
    ) -> RelationResult<bool> {
        match op {
            RelationOp::Add => {
                let items = sequence_payload(definition, payload)?;
                let foreign_key = definition.foreign_key_for(owner);
                self.adapter.begin_transaction().await?;
                for mut item in items {
                    item.set(foreign_key.clone(), join.clone());
                    if let Err(err) = self.adapter.insert(&definition.target, &item).await {
                        return Err(self.fail_with_rollback(err).await);
                    }
                }
                self.adapter.commit().await?;
                Ok(true)
            }
            RelationOp::Save => {
                let items = sequence_payload(definition, payload)?;
                let foreign_key = definition.foreign_key_for(owner);
                let target_pk = self.adapter.primary_key_name(&definition.target);
                self.adapter.begin_transaction().await?;
                let mut outcome = false;
                for mut item in items {
                    let step = match item.get(&target_pk).filter(|v| !v.is_null()).cloned() {
                        // The item carries its own primary key: update it.
                        Some(pk_value) => {
                            let filter = Filter::eq(target_pk.clone(), pk_value);
                            self.adapter
                                .update(&definition.target, &filter, &item)
                                .await
                                .map(|affected| affected > 0)
                        }
                        None => {
                            item.set(foreign_key.clone(), join.clone());
                            self.adapter
                                .insert(&definition.target, &item)
                                .await
                                .map(|_| true)
                        }
                    };
                    match step {
                        Ok(result) => outcome = result,
                        Err(err) => return Err(self.fail_with_rollback(err).await),
                    }
                }
                self.adapter.commit().await?;
                Ok(outcome)
            }
            // A single statement; no transaction needed.
            RelationOp::Del => {
                let filter = write_filter(definition, owner, join);
                let affected = self.adapter.delete(&definition.target, &filter).await?;
                Ok(affected > 0)
            }
        }
    }

    async fn apply_many_to_many(
        &self,
        op: RelationOp,
        owner: &str,
        definition: &RelationDefinition,
        join: &Value,
        payload: Option<&Value>,
    ) -> RelationResult<bool> {
        let junction = JunctionRef {
            table: definition.junction_table(owner, &self.adapter.table_prefix()),
            owner_key: definition.foreign_key_for(owner),
            target_key: definition.relation_foreign_key_or_default(),
        };
        // Both sides' primary keys must be resolvable before any mutation.
        let owner_pk = self.adapter.primary_key_name(owner);
        let target_pk = self.adapter.primary_key_name(&definition.target);

        match op {
            RelationOp::Del => {
                let filter = junction_filter(definition, &junction, join);
                let statement = junction::delete_where(&junction.table, &filter);
                let affected = self.adapter.raw_execute(&statement).await?;
                Ok(affected > 0)
            }
            RelationOp::Add | RelationOp::Save => {
                let ids = target_ids(definition, payload, &target_pk)?;
                if ids.is_empty() {
                    return Ok(false);
                }
                self.adapter.begin_transaction().await?;
                if op == RelationOp::Save {
                    // Rewrite: clear the owner's junction rows, then re-pair.
                    let filter = junction_filter(definition, &junction, join);
                    let statement = junction::delete_where(&junction.table, &filter);
                    if let Err(err) = self.adapter.raw_execute(&statement).await {
                        return Err(self.fail_with_rollback(err).await);
                    }
                }
                let statement = junction::insert_pairs(
                    &junction,
                    &self.adapter.table_name(owner),
                    &owner_pk,
                    &self.adapter.table_name(&definition.target),
                    &target_pk,
                    join,
                    &ids,
                );
                match self.adapter.raw_execute(&statement).await {
                    Ok(affected) => {
                        self.adapter.commit().await?;
                        Ok(affected > 0)
                    }
                    Err(err) => Err(self.fail_with_rollback(err).await),
                }
            }
        }
    }

    /// Propagate the same operation to the related payload with the
    /// definition's `deep` filter.
    async fn descend(
        &self,
        op: RelationOp,
        definition: &RelationDefinition,
        payload: &Value,
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
        match payload {
            Value::Object(fields) => {
                self.apply_inner(op, &definition.target, fields, deep, next)
                    .await?;
            }
            Value::Array(items) => {
                for item in items {
                    if let Value::Object(fields) = item {
                        self.apply_inner(op, &definition.target, fields, deep, next)
                            .await?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Roll back the current transaction and hand the original error back
    async fn fail_with_rollback(&self, err: RelationError) -> RelationError {
        if let Err(rollback_err) = self.adapter.rollback().await {
            warn!(error = %rollback_err, "rollback after failed relation mutation also failed");
        }
        err
    }
}

/// Join filter for the write path. An explicit `condition` on the
/// definition replaces the derived foreign-key condition.
fn write_filter(definition: &RelationDefinition, owner: &str, join: &Value) -> Filter {
    match &definition.condition {
        Some(condition) => Filter::raw(condition.clone()),
        None => Filter::eq(definition.foreign_key_for(owner), join.clone()),
    }
}

/// Junction-table variant of [`write_filter`]
fn junction_filter(definition: &RelationDefinition, junction: &JunctionRef, join: &Value) -> Filter {
    match &definition.condition {
        Some(condition) => Filter::raw(condition.clone()),
        None => Filter::eq(junction.owner_key.clone(), join.clone()),
    }
}

/// True when a related-data payload is present and non-empty
fn payload_present(payload: Option<&Value>) -> bool {
    match payload {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
        Some(_) => true,
    }
}

/// Payload for single-record relations: must be a mapping
fn record_payload(
    definition: &RelationDefinition,
    payload: Option<&Value>,
) -> RelationResult<Record> {
    match payload {
        Some(Value::Object(fields)) => Ok(Record::from_fields(fields.clone())),
        _ => Err(RelationError::InvalidInput(format!(
            "payload for relation '{}' must be a record mapping",
            definition.mapping_name
        ))),
    }
}

/// Payload for sequence relations: must be a sequence of mappings
fn sequence_payload(
    definition: &RelationDefinition,
    payload: Option<&Value>,
) -> RelationResult<Vec<Record>> {
    let Some(Value::Array(items)) = payload else {
        return Err(RelationError::InvalidInput(format!(
            "payload for relation '{}' must be a sequence of record mappings",
            definition.mapping_name
        )));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(fields) => Ok(Record::from_fields(fields.clone())),
            _ => Err(RelationError::InvalidInput(format!(
                "payload items for relation '{}' must be record mappings",
                definition.mapping_name
            ))),
        })
        .collect()
}

/// Target primary keys present in a MANY_TO_MANY payload. Items without a
/// primary key value are skipped.
fn target_ids(
    definition: &RelationDefinition,
    payload: Option<&Value>,
    target_pk: &str,
) -> RelationResult<Vec<Value>> {
    let items: Vec<&Value> = match payload {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => {
            return Err(RelationError::InvalidInput(format!(
                "payload for relation '{}' must hold the target records to pair",
                definition.mapping_name
            )));
        }
    };
    let mut ids = Vec::new();
    for item in items {
        let Value::Object(fields) = item else {
            return Err(RelationError::InvalidInput(format!(
                "payload items for relation '{}' must be record mappings",
                definition.mapping_name
            )));
        };
        if let Some(id) = fields.get(target_pk).filter(|v| !v.is_null()) {
            ids.push(id.clone());
        }
    }
    Ok(ids)
}
