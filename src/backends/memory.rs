//! In-memory data store
//!
//! A complete [`DataStoreAdapter`] over in-process tables, used by the test
//! suite and handy for prototyping. Rows keep insertion order, integer
//! primary keys auto-increment per table, and transactions are snapshot
//! based with the outermost-only begin/commit contract from the trait docs.
//!
//! The raw statement methods interpret exactly the junction statement
//! shapes produced by [`crate::relations::junction`]; anything else is
//! rejected with a store error.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::adapter::DataStoreAdapter;
use crate::error::{RelationError, RelationResult};
use crate::filter::{Comparison, Filter, Predicate};
use crate::record::{Record, RecordSet};
use crate::relations::naming::snake_case;
use crate::sql::SqlStatement;

#[derive(Debug, Clone)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Table>,
    tx_depth: usize,
    snapshot: Option<HashMap<String, Table>>,
}

/// In-process table store implementing [`DataStoreAdapter`]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
    prefix: String,
    primary_keys: DashMap<String, String>,
    insert_faults: DashMap<String, u64>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    /// A store with no table prefix
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// A store whose physical table names are `prefix + snake_case(entity)`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            prefix: prefix.into(),
            primary_keys: DashMap::new(),
            insert_faults: DashMap::new(),
        }
    }

    /// Override the primary key field name for an entity type
    pub fn set_primary_key(&self, entity: impl Into<String>, name: impl Into<String>) {
        self.primary_keys.insert(entity.into(), name.into());
    }

    /// Make inserts for `entity` fail after `allowed` more successes.
    /// Used by tests exercising write-path atomicity.
    pub fn fail_inserts_after(&self, entity: impl Into<String>, allowed: u64) {
        self.insert_faults.insert(entity.into(), allowed);
    }

    /// Insert a row bypassing fault injection, for test setup.
    /// Returns the primary key value of the stored row.
    pub fn seed(&self, entity: &str, value: Value) -> RelationResult<Value> {
        let record = Record::from_value(value)?;
        let key = self.table_key(entity);
        let pk = self.primary_key_name(entity);
        let mut state = self.lock()?;
        let table = state.tables.entry(key).or_default();
        Ok(insert_into(table, &pk, &record))
    }

    /// Insert a raw row into a physical table, junction tables included
    pub fn seed_table(&self, table: &str, value: Value) -> RelationResult<()> {
        let record = Record::from_value(value)?;
        let mut state = self.lock()?;
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .rows
            .push(record);
        Ok(())
    }

    /// Rows of an entity's table in insertion order
    pub fn rows(&self, entity: &str) -> RelationResult<RecordSet> {
        let key = self.table_key(entity);
        self.table_rows(&key)
    }

    /// Rows of a physical table in insertion order
    pub fn table_rows(&self, table: &str) -> RelationResult<RecordSet> {
        let state = self.lock()?;
        Ok(state
            .tables
            .get(table)
            .map(|table| table.rows.clone())
            .unwrap_or_default())
    }

    fn table_key(&self, entity: &str) -> String {
        format!("{}{}", self.prefix, snake_case(entity))
    }

    fn lock(&self) -> RelationResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| RelationError::Store("memory store lock poisoned".to_string()))
    }

    fn consume_fault(&self, entity: &str) -> RelationResult<()> {
        if let Some(mut remaining) = self.insert_faults.get_mut(entity) {
            if *remaining == 0 {
                return Err(RelationError::Store(format!(
                    "injected insert failure for {entity}"
                )));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl DataStoreAdapter for MemoryAdapter {
    async fn find(
        &self,
        entity: &str,
        filter: &Filter,
        fields: &str,
    ) -> RelationResult<Option<Record>> {
        let key = self.table_key(entity);
        let state = self.lock()?;
        let Some(table) = state.tables.get(&key) else {
            return Ok(None);
        };
        for row in &table.rows {
            if filter_matches(filter, row)? {
                return Ok(Some(project(row, fields)));
            }
        }
        Ok(None)
    }

    async fn select_many(
        &self,
        entity: &str,
        filter: &Filter,
        fields: &str,
        order: Option<&str>,
        limit: Option<u64>,
    ) -> RelationResult<RecordSet> {
        let key = self.table_key(entity);
        let state = self.lock()?;
        let mut rows = Vec::new();
        if let Some(table) = state.tables.get(&key) {
            for row in &table.rows {
                if filter_matches(filter, row)? {
                    rows.push(row.clone());
                }
            }
        }
        if let Some(order) = order {
            apply_order(&mut rows, order);
        }
        if let Some(limit) = limit {
            rows.truncate(limit as usize);
        }
        Ok(rows.iter().map(|row| project(row, fields)).collect())
    }

    async fn insert(&self, entity: &str, record: &Record) -> RelationResult<Value> {
        self.consume_fault(entity)?;
        let key = self.table_key(entity);
        let pk = self.primary_key_name(entity);
        let mut state = self.lock()?;
        let table = state.tables.entry(key).or_default();
        let value = insert_into(table, &pk, record);
        debug!(entity, pk = %value, "memory insert");
        Ok(value)
    }

    async fn update(&self, entity: &str, filter: &Filter, record: &Record) -> RelationResult<u64> {
        let key = self.table_key(entity);
        let mut state = self.lock()?;
        let mut affected = 0;
        if let Some(table) = state.tables.get_mut(&key) {
            for row in table.rows.iter_mut() {
                if filter_matches(filter, row)? {
                    for (field, value) in record.fields() {
                        row.set(field.clone(), value.clone());
                    }
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    async fn delete(&self, entity: &str, filter: &Filter) -> RelationResult<u64> {
        let key = self.table_key(entity);
        let mut state = self.lock()?;
        let mut removed = 0;
        if let Some(table) = state.tables.get_mut(&key) {
            let rows = std::mem::take(&mut table.rows);
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                if filter_matches(filter, &row)? {
                    removed += 1;
                } else {
                    kept.push(row);
                }
            }
            table.rows = kept;
        }
        Ok(removed)
    }

    async fn raw_query(&self, statement: &SqlStatement) -> RelationResult<RecordSet> {
        let state = self.lock()?;
        if statement.sql().starts_with("SELECT ") {
            run_join_select(&state, statement.sql(), statement.params())
        } else {
            Err(unsupported(statement.sql()))
        }
    }

    async fn raw_execute(&self, statement: &SqlStatement) -> RelationResult<u64> {
        let mut state = self.lock()?;
        let sql = statement.sql();
        if sql.starts_with("INSERT INTO ") {
            run_insert_select(&mut state, sql, statement.params())
        } else if sql.starts_with("DELETE FROM ") {
            run_delete(&mut state, sql, statement.params())
        } else {
            Err(unsupported(sql))
        }
    }

    async fn begin_transaction(&self) -> RelationResult<()> {
        let mut state = self.lock()?;
        if state.tx_depth == 0 {
            state.snapshot = Some(state.tables.clone());
        }
        state.tx_depth += 1;
        Ok(())
    }

    async fn commit(&self) -> RelationResult<()> {
        let mut state = self.lock()?;
        if state.tx_depth == 0 {
            return Err(RelationError::Transaction(
                "commit without active transaction".to_string(),
            ));
        }
        state.tx_depth -= 1;
        if state.tx_depth == 0 {
            state.snapshot = None;
        }
        Ok(())
    }

    async fn rollback(&self) -> RelationResult<()> {
        let mut state = self.lock()?;
        if state.tx_depth == 0 {
            return Err(RelationError::Transaction(
                "rollback without active transaction".to_string(),
            ));
        }
        let snapshot = state.snapshot.take().ok_or_else(|| {
            RelationError::Transaction("missing transaction snapshot".to_string())
        })?;
        state.tables = snapshot;
        state.tx_depth = 0;
        debug!("memory rollback to outermost begin");
        Ok(())
    }

    fn primary_key_name(&self, entity: &str) -> String {
        self.primary_keys
            .get(entity)
            .map(|pk| pk.value().clone())
            .unwrap_or_else(|| "id".to_string())
    }

    fn table_name(&self, entity: &str) -> String {
        self.table_key(entity)
    }

    fn table_prefix(&self) -> String {
        self.prefix.clone()
    }
}

/// Store a row, assigning the next integer primary key when absent
fn insert_into(table: &mut Table, pk: &str, record: &Record) -> Value {
    let mut row = record.clone();
    let existing = row.get(pk).filter(|value| !value.is_null()).cloned();
    let pk_value = match existing {
        Some(value) => {
            if let Some(id) = value.as_i64() {
                if id >= table.next_id {
                    table.next_id = id + 1;
                }
            }
            value
        }
        None => {
            let value = Value::from(table.next_id);
            table.next_id += 1;
            row.set(pk.to_string(), value.clone());
            value
        }
    };
    table.rows.push(row);
    pk_value
}

fn filter_matches(filter: &Filter, record: &Record) -> RelationResult<bool> {
    let null = Value::Null;
    for predicate in filter.predicates() {
        let actual = record.get(&predicate.column).unwrap_or(&null);
        if !predicate_matches(predicate, actual) {
            return Ok(false);
        }
    }
    if let Some(raw) = filter.raw_clause() {
        for term in raw.split(" AND ") {
            let term = term.trim();
            if term.is_empty() || term == "1=1" {
                continue;
            }
            if !raw_term_matches(term, record)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn predicate_matches(predicate: &Predicate, actual: &Value) -> bool {
    match predicate.comparison {
        Comparison::Equal => values_equal(actual, &predicate.value),
        Comparison::NotEqual => !values_equal(actual, &predicate.value),
        Comparison::In => predicate
            .value
            .as_array()
            .map(|items| items.iter().any(|item| values_equal(actual, item)))
            .unwrap_or(false),
        comparison => match compare_values(actual, &predicate.value) {
            Some(ordering) => match comparison {
                Comparison::GreaterThan => ordering == Ordering::Greater,
                Comparison::LessThan => ordering == Ordering::Less,
                Comparison::GreaterThanOrEqual => ordering != Ordering::Less,
                Comparison::LessThanOrEqual => ordering != Ordering::Greater,
                _ => false,
            },
            None => false,
        },
    }
}

/// Evaluate one `column <op> literal` term of a raw condition
fn raw_term_matches(term: &str, record: &Record) -> RelationResult<bool> {
    let null = Value::Null;
    for op in ["!=", "<>", ">=", "<=", "=", ">", "<"] {
        let Some(pos) = term.find(op) else { continue };
        let column = term[..pos].trim();
        let literal = parse_literal(term[pos + op.len()..].trim())?;
        let actual = record.get(column).unwrap_or(&null);
        let matched = match op {
            "=" => values_equal(actual, &literal),
            "!=" | "<>" => !values_equal(actual, &literal),
            ">" => compare_values(actual, &literal) == Some(Ordering::Greater),
            "<" => compare_values(actual, &literal) == Some(Ordering::Less),
            ">=" => matches!(
                compare_values(actual, &literal),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            _ => matches!(
                compare_values(actual, &literal),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
        };
        return Ok(matched);
    }
    Err(RelationError::Store(format!(
        "unsupported raw condition term: {term}"
    )))
}

fn parse_literal(text: &str) -> RelationResult<Value> {
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Value::String(inner.to_string()));
    }
    if text.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if text.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }
    serde_json::from_str(text).map_err(|_| {
        RelationError::Store(format!("unsupported literal in raw condition: {text}"))
    })
}

/// Loose equality: numbers compare by value regardless of representation
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Keep only the listed fields; `*` keeps everything
fn project(record: &Record, fields: &str) -> Record {
    if fields.trim() == "*" {
        return record.clone();
    }
    let mut projected = Record::new();
    for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if let Some(value) = record.get(field) {
            projected.set(field.to_string(), value.clone());
        }
    }
    projected
}

/// Stable sort by the first `column [ASC|DESC]` segment of an order clause
fn apply_order(rows: &mut RecordSet, order: &str) {
    let clause = order.split(',').next().unwrap_or("").trim();
    let mut parts = clause.split_whitespace();
    let Some(column) = parts.next() else {
        return;
    };
    let descending = parts
        .next()
        .map(|dir| dir.eq_ignore_ascii_case("desc"))
        .unwrap_or(false);
    rows.sort_by(|a, b| {
        let null = Value::Null;
        let left = a.get(column).unwrap_or(&null);
        let right = b.get(column).unwrap_or(&null);
        let ordering = compare_values(left, right).unwrap_or(Ordering::Equal);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn unsupported(sql: &str) -> RelationError {
    RelationError::Store(format!("unsupported raw statement: {sql}"))
}

fn split_on<'a>(text: &'a str, separator: &str, sql: &str) -> RelationResult<(&'a str, &'a str)> {
    text.split_once(separator).ok_or_else(|| unsupported(sql))
}

fn parse_aliased_tables<'a>(tables_part: &'a str, sql: &str) -> RelationResult<(&'a str, &'a str)> {
    let (first, second) = split_on(tables_part, ", ", sql)?;
    let first = first.strip_suffix(" AS a").ok_or_else(|| unsupported(sql))?;
    let second = second.strip_suffix(" AS b").ok_or_else(|| unsupported(sql))?;
    Ok((first, second))
}

/// Interpret the junction read:
/// `SELECT b.<fields> FROM <junction> AS a, <target> AS b
///  WHERE a.<target_key> = b.<target_pk> AND a.<owner_key> = $1 ...`
fn run_join_select(
    state: &MemoryState,
    sql: &str,
    params: &[Value],
) -> RelationResult<RecordSet> {
    let rest = sql.strip_prefix("SELECT ").ok_or_else(|| unsupported(sql))?;
    let (fields_part, rest) = split_on(rest, " FROM ", sql)?;
    let (tables_part, where_part) = split_on(rest, " WHERE ", sql)?;
    let (junction_table, target_table) = parse_aliased_tables(tables_part, sql)?;

    let mut conditions = where_part;
    let mut limit = None;
    if let Some((head, tail)) = conditions.rsplit_once(" LIMIT ") {
        if let Ok(n) = tail.trim().parse::<usize>() {
            limit = Some(n);
            conditions = head;
        }
    }
    let mut order = None;
    if let Some((head, tail)) = conditions.split_once(" ORDER BY ") {
        order = Some(tail.trim().to_string());
        conditions = head;
    }

    let mut terms = conditions.split(" AND ");
    let join_term = terms.next().ok_or_else(|| unsupported(sql))?;
    let owner_term = terms.next().ok_or_else(|| unsupported(sql))?;
    let extra: Vec<&str> = terms.collect();

    let (left, right) = split_on(join_term, " = ", sql)?;
    let target_key = left.strip_prefix("a.").ok_or_else(|| unsupported(sql))?;
    let target_pk = right.strip_prefix("b.").ok_or_else(|| unsupported(sql))?;
    let (left, right) = split_on(owner_term, " = ", sql)?;
    let owner_key = left.strip_prefix("a.").ok_or_else(|| unsupported(sql))?;
    if !right.trim().starts_with('$') {
        return Err(unsupported(sql));
    }
    let owner_value = params.first().ok_or_else(|| unsupported(sql))?;

    let fields = if fields_part.trim() == "b.*" {
        "*".to_string()
    } else {
        fields_part
            .split(", ")
            .map(|field| field.trim().trim_start_matches("b."))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let empty: &[Record] = &[];
    let junction_rows = state
        .tables
        .get(junction_table)
        .map(|table| table.rows.as_slice())
        .unwrap_or(empty);
    let target_rows = state
        .tables
        .get(target_table)
        .map(|table| table.rows.as_slice())
        .unwrap_or(empty);

    let null = Value::Null;
    let mut results = Vec::new();
    for link in junction_rows {
        if !values_equal(link.get(owner_key).unwrap_or(&null), owner_value) {
            continue;
        }
        let link_target = link.get(target_key).unwrap_or(&null);
        for row in target_rows {
            if !values_equal(row.get(target_pk).unwrap_or(&null), link_target) {
                continue;
            }
            let mut keep = true;
            for term in &extra {
                if !raw_term_matches(term.trim(), row)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                results.push(row.clone());
            }
        }
    }
    if let Some(order) = &order {
        apply_order(&mut results, order);
    }
    if let Some(limit) = limit {
        results.truncate(limit);
    }
    Ok(results.iter().map(|row| project(row, &fields)).collect())
}

/// Interpret the junction bulk insert:
/// `INSERT INTO <junction> (<owner_key>, <target_key>)
///  SELECT a.<owner_pk>, b.<target_pk> FROM <owner> AS a, <target> AS b
///  WHERE a.<owner_pk> = $1 AND b.<target_pk> IN (...)`
fn run_insert_select(
    state: &mut MemoryState,
    sql: &str,
    params: &[Value],
) -> RelationResult<u64> {
    let rest = sql
        .strip_prefix("INSERT INTO ")
        .ok_or_else(|| unsupported(sql))?;
    let (junction_table, rest) = split_on(rest, " (", sql)?;
    let (columns_part, rest) = split_on(rest, ") SELECT ", sql)?;
    let (owner_key, target_key) = split_on(columns_part, ", ", sql)?;
    let (select_part, rest) = split_on(rest, " FROM ", sql)?;
    let (owner_sel, target_sel) = split_on(select_part, ", ", sql)?;
    let owner_pk = owner_sel.strip_prefix("a.").ok_or_else(|| unsupported(sql))?;
    let target_pk = target_sel
        .strip_prefix("b.")
        .ok_or_else(|| unsupported(sql))?;
    let (tables_part, _where_part) = split_on(rest, " WHERE ", sql)?;
    let (owner_table, target_table) = parse_aliased_tables(tables_part, sql)?;

    let owner_value = params.first().ok_or_else(|| unsupported(sql))?;
    let ids = &params[1..];

    let null = Value::Null;
    let owner_exists = state
        .tables
        .get(owner_table)
        .map(|table| {
            table
                .rows
                .iter()
                .any(|row| values_equal(row.get(owner_pk).unwrap_or(&null), owner_value))
        })
        .unwrap_or(false);
    if !owner_exists {
        return Ok(0);
    }

    let mut pairs = Vec::new();
    for id in ids {
        let found = state.tables.get(target_table).and_then(|table| {
            table
                .rows
                .iter()
                .find(|row| values_equal(row.get(target_pk).unwrap_or(&null), id))
        });
        if let Some(row) = found {
            let target_value = row.get(target_pk).cloned().unwrap_or(Value::Null);
            pairs.push((owner_value.clone(), target_value));
        }
    }

    let table = state.tables.entry(junction_table.to_string()).or_default();
    let affected = pairs.len() as u64;
    for (owner_value, target_value) in pairs {
        let mut link = Record::new();
        link.set(owner_key.to_string(), owner_value);
        link.set(target_key.to_string(), target_value);
        table.rows.push(link);
    }
    Ok(affected)
}

/// Interpret `DELETE FROM <table> WHERE <clause>`, where clause terms are
/// either `column = $n` placeholders or raw literal comparisons.
fn run_delete(state: &mut MemoryState, sql: &str, params: &[Value]) -> RelationResult<u64> {
    let rest = sql
        .strip_prefix("DELETE FROM ")
        .ok_or_else(|| unsupported(sql))?;
    let (table_name, clause) = split_on(rest, " WHERE ", sql)?;
    let Some(table) = state.tables.get_mut(table_name) else {
        return Ok(0);
    };
    let rows = std::mem::take(&mut table.rows);
    let mut kept = Vec::with_capacity(rows.len());
    let mut removed = 0;
    for row in rows {
        if clause_matches(clause, params, &row)? {
            removed += 1;
        } else {
            kept.push(row);
        }
    }
    table.rows = kept;
    Ok(removed)
}

fn clause_matches(clause: &str, params: &[Value], record: &Record) -> RelationResult<bool> {
    let null = Value::Null;
    for term in clause.split(" AND ") {
        let term = term.trim();
        if term.is_empty() || term == "1=1" {
            continue;
        }
        if let Some((column, placeholder)) = term.split_once(" = ") {
            if let Some(index) = placeholder.trim().strip_prefix('$') {
                let index: usize = index
                    .parse()
                    .map_err(|_| unsupported(term))?;
                let expected = params.get(index - 1).ok_or_else(|| unsupported(term))?;
                if !values_equal(record.get(column.trim()).unwrap_or(&null), expected) {
                    return Ok(false);
                }
                continue;
            }
        }
        if !raw_term_matches(term, record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::junction::{self, JunctionRef};
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_and_respects_primary_keys() {
        let store = MemoryAdapter::new();
        let first = store
            .insert("Order", &record(json!({"status": "open"})))
            .await
            .unwrap();
        assert_eq!(first, json!(1));

        let explicit = store
            .insert("Order", &record(json!({"id": 10, "status": "open"})))
            .await
            .unwrap();
        assert_eq!(explicit, json!(10));

        // counter moves past explicit keys
        let next = store
            .insert("Order", &record(json!({"status": "closed"})))
            .await
            .unwrap();
        assert_eq!(next, json!(11));
    }

    #[tokio::test]
    async fn test_find_select_with_predicates_and_raw_terms() {
        let store = MemoryAdapter::new();
        store
            .seed("User", json!({"name": "ada", "age": 36, "status": "active"}))
            .unwrap();
        store
            .seed("User", json!({"name": "bob", "age": 41, "status": "idle"}))
            .unwrap();
        store
            .seed("User", json!({"name": "cyd", "age": 29, "status": "active"}))
            .unwrap();

        let found = store
            .find("User", &Filter::eq("name", json!("bob")), "*")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("age"), Some(&json!(41)));

        let filter = Filter::raw("status='active' AND age > 30");
        let set = store
            .select_many("User", &filter, "name", Some("name DESC"), None)
            .await
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get("name"), Some(&json!("ada")));
        assert!(set[0].get("age").is_none());
    }

    #[tokio::test]
    async fn test_select_order_and_limit() {
        let store = MemoryAdapter::new();
        for age in [30, 10, 20] {
            store.seed("User", json!({"age": age})).unwrap();
        }
        let set = store
            .select_many("User", &Filter::all(), "*", Some("age"), Some(2))
            .await
            .unwrap();
        let ages: Vec<_> = set.iter().map(|row| row.get("age").cloned()).collect();
        assert_eq!(ages, vec![Some(json!(10)), Some(json!(20))]);
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let store = MemoryAdapter::new();
        store.seed("Task", json!({"state": "open"})).unwrap();
        store.seed("Task", json!({"state": "open"})).unwrap();
        store.seed("Task", json!({"state": "done"})).unwrap();

        let affected = store
            .update(
                "Task",
                &Filter::eq("state", json!("open")),
                &record(json!({"state": "stale"})),
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let removed = store
            .delete("Task", &Filter::eq("state", json!("stale")))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.rows("Task").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_restores_outermost_snapshot() {
        let store = MemoryAdapter::new();
        store.seed("Order", json!({"status": "kept"})).unwrap();

        store.begin_transaction().await.unwrap();
        store
            .insert("Order", &record(json!({"status": "outer"})))
            .await
            .unwrap();
        store.begin_transaction().await.unwrap();
        store
            .insert("Order", &record(json!({"status": "inner"})))
            .await
            .unwrap();
        // rollback unwinds both levels
        store.rollback().await.unwrap();

        let rows = store.rows("Order").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("status"), Some(&json!("kept")));
        assert!(store.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_nested_commit_keeps_changes() {
        let store = MemoryAdapter::new();
        store.begin_transaction().await.unwrap();
        store.begin_transaction().await.unwrap();
        store
            .insert("Order", &record(json!({"status": "new"})))
            .await
            .unwrap();
        store.commit().await.unwrap();
        store.commit().await.unwrap();
        assert_eq!(store.rows("Order").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_fault_injection() {
        let store = MemoryAdapter::new();
        store.fail_inserts_after("OrderItem", 1);
        assert!(store
            .insert("OrderItem", &record(json!({"sku": "A"})))
            .await
            .is_ok());
        assert!(store
            .insert("OrderItem", &record(json!({"sku": "B"})))
            .await
            .is_err());
        // other entities are unaffected
        assert!(store
            .insert("Order", &record(json!({"status": "open"})))
            .await
            .is_ok());
    }

    fn link_ref() -> JunctionRef {
        JunctionRef {
            table: "order_tag".to_string(),
            owner_key: "order_id".to_string(),
            target_key: "tag_id".to_string(),
        }
    }

    #[tokio::test]
    async fn test_join_select_follows_junction_rows() {
        let store = MemoryAdapter::new();
        store.seed("Tag", json!({"label": "red", "visible": 1})).unwrap();
        store.seed("Tag", json!({"label": "blue", "visible": 0})).unwrap();
        store
            .seed_table("order_tag", json!({"order_id": 7, "tag_id": 1}))
            .unwrap();
        store
            .seed_table("order_tag", json!({"order_id": 7, "tag_id": 2}))
            .unwrap();
        store
            .seed_table("order_tag", json!({"order_id": 8, "tag_id": 1}))
            .unwrap();

        let stmt = junction::select_related(
            &link_ref(),
            "tag",
            "id",
            &json!(7),
            "*",
            None,
            None,
            None,
        );
        let set = store.raw_query(&stmt).await.unwrap();
        let labels: Vec<_> = set.iter().map(|row| row.get("label").cloned()).collect();
        assert_eq!(labels, vec![Some(json!("red")), Some(json!("blue"))]);

        let stmt = junction::select_related(
            &link_ref(),
            "tag",
            "id",
            &json!(7),
            "label",
            Some("visible = 1"),
            None,
            None,
        );
        let set = store.raw_query(&stmt).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].get("label"), Some(&json!("red")));
    }

    #[tokio::test]
    async fn test_insert_pairs_skips_unknown_targets() {
        let store = MemoryAdapter::new();
        store.seed("Order", json!({"status": "open"})).unwrap();
        store.seed("Tag", json!({"label": "red"})).unwrap();
        store.seed("Tag", json!({"label": "blue"})).unwrap();

        let stmt = junction::insert_pairs(
            &link_ref(),
            "order",
            "id",
            "tag",
            "id",
            &json!(1),
            &[json!(1), json!(2), json!(99)],
        );
        let affected = store.raw_execute(&stmt).await.unwrap();
        assert_eq!(affected, 2);

        let links = store.table_rows("order_tag").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].get("order_id"), Some(&json!(1)));
        assert_eq!(links[1].get("tag_id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_insert_pairs_without_owner_row_is_a_no_op() {
        let store = MemoryAdapter::new();
        store.seed("Tag", json!({"label": "red"})).unwrap();
        let stmt = junction::insert_pairs(
            &link_ref(),
            "order",
            "id",
            "tag",
            "id",
            &json!(42),
            &[json!(1)],
        );
        assert_eq!(store.raw_execute(&stmt).await.unwrap(), 0);
        assert!(store.table_rows("order_tag").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_where_on_junction_table() {
        let store = MemoryAdapter::new();
        store
            .seed_table("order_tag", json!({"order_id": 1, "tag_id": 10}))
            .unwrap();
        store
            .seed_table("order_tag", json!({"order_id": 2, "tag_id": 10}))
            .unwrap();

        let stmt = junction::delete_where("order_tag", &Filter::eq("order_id", json!(1)));
        assert_eq!(store.raw_execute(&stmt).await.unwrap(), 1);
        let remaining = store.table_rows("order_tag").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get("order_id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_prefix_shapes_table_names() {
        let store = MemoryAdapter::with_prefix("app_");
        assert_eq!(store.table_name("OrderItem"), "app_order_item");
        assert_eq!(store.table_prefix(), "app_");
        store.set_primary_key("Legacy", "legacy_id");
        assert_eq!(store.primary_key_name("Legacy"), "legacy_id");
        assert_eq!(store.primary_key_name("Order"), "id");
    }

    #[tokio::test]
    async fn test_unsupported_raw_statement_is_rejected() {
        let store = MemoryAdapter::new();
        let mut stmt = SqlStatement::new();
        stmt.push("TRUNCATE order_tag");
        assert!(store.raw_execute(&stmt).await.is_err());
        assert!(store.raw_query(&stmt).await.is_err());
    }
}
