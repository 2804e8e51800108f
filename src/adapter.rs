//! Data store adapter contract
//!
//! The engine never talks to a database directly; both the read path and the
//! write path issue operations through this trait. Implementations are
//! expected to be store-bound handles able to address any entity type by
//! name, supplied to the engine at construction.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RelationResult;
use crate::filter::Filter;
use crate::record::{Record, RecordSet};
use crate::sql::SqlStatement;

/// Abstract data store boundary consumed by the resolver and mutator.
///
/// Transactions are scoped to a single store connection. Nested
/// `begin_transaction`/`commit` calls must be idempotent-safe: only the
/// outermost pair is effective, and `rollback` unwinds to the state at the
/// outermost begin.
#[async_trait]
pub trait DataStoreAdapter: Send + Sync {
    /// Fetch a single record matching the filter, or `None`
    async fn find(
        &self,
        entity: &str,
        filter: &Filter,
        fields: &str,
    ) -> RelationResult<Option<Record>>;

    /// Fetch an ordered set of records matching the filter
    async fn select_many(
        &self,
        entity: &str,
        filter: &Filter,
        fields: &str,
        order: Option<&str>,
        limit: Option<u64>,
    ) -> RelationResult<RecordSet>;

    /// Insert a record, returning the generated primary key value
    async fn insert(&self, entity: &str, record: &Record) -> RelationResult<Value>;

    /// Update records matching the filter, returning the affected-row count
    async fn update(&self, entity: &str, filter: &Filter, record: &Record) -> RelationResult<u64>;

    /// Delete records matching the filter, returning the affected-row count
    async fn delete(&self, entity: &str, filter: &Filter) -> RelationResult<u64>;

    /// Execute a parameterized query returning rows (junction-table reads)
    async fn raw_query(&self, statement: &SqlStatement) -> RelationResult<RecordSet>;

    /// Execute a parameterized statement returning the affected-row count
    /// (junction-table bulk inserts and deletes)
    async fn raw_execute(&self, statement: &SqlStatement) -> RelationResult<u64>;

    /// Begin a transaction (outermost-only effective when nested)
    async fn begin_transaction(&self) -> RelationResult<()>;

    /// Commit the current transaction
    async fn commit(&self) -> RelationResult<()>;

    /// Roll back to the state at the outermost begin
    async fn rollback(&self) -> RelationResult<()>;

    /// Primary key field name for an entity type
    fn primary_key_name(&self, entity: &str) -> String;

    /// Physical table name for an entity type (prefix included)
    fn table_name(&self, entity: &str) -> String;

    /// Table name prefix applied by this store
    fn table_prefix(&self) -> String;
}
