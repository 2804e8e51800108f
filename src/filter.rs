//! Structured filter conditions
//!
//! Filters are built from typed predicates so join values are always bound
//! as parameters when rendered to SQL. A filter may additionally carry a raw
//! clause taken verbatim from a relation definition's `condition` setting.

use serde_json::Value;

use crate::sql::SqlStatement;

/// Comparison operators supported by filter predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    In,
}

impl Comparison {
    /// SQL representation of the operator
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
            Self::In => "IN",
        }
    }
}

/// A single column comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub comparison: Comparison,
    pub value: Value,
}

/// A conjunction of predicates plus an optional raw clause.
///
/// An empty filter is always true.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
    raw: Option<String>,
}

impl Filter {
    /// The always-true filter
    pub fn all() -> Self {
        Self::default()
    }

    /// A single equality predicate
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::all().and_eq(column, value)
    }

    /// A filter consisting only of a raw clause
    pub fn raw(clause: impl Into<String>) -> Self {
        Self {
            predicates: Vec::new(),
            raw: Some(clause.into()),
        }
    }

    /// Add an equality predicate
    pub fn and_eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.predicates.push(Predicate {
            column: column.into(),
            comparison: Comparison::Equal,
            value,
        });
        self
    }

    /// Add a predicate with an explicit comparison
    pub fn and(mut self, column: impl Into<String>, comparison: Comparison, value: Value) -> Self {
        self.predicates.push(Predicate {
            column: column.into(),
            comparison,
            value,
        });
        self
    }

    /// Attach a raw clause, ANDed with the predicates
    pub fn and_raw(mut self, clause: impl Into<String>) -> Self {
        self.raw = Some(clause.into());
        self
    }

    /// The typed predicates
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// The raw clause, if any
    pub fn raw_clause(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// True when the filter matches everything
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.raw.is_none()
    }

    /// Render the filter as a WHERE-clause body, binding predicate values
    /// as parameters on `stmt`. Returns `1=1` for the empty filter so the
    /// result can always be embedded after `WHERE`.
    pub fn render(&self, stmt: &mut SqlStatement) -> String {
        let mut clauses = Vec::new();
        for predicate in &self.predicates {
            match (&predicate.comparison, &predicate.value) {
                (Comparison::In, Value::Array(items)) => {
                    let placeholders: Vec<String> =
                        items.iter().map(|item| stmt.bind(item.clone())).collect();
                    clauses.push(format!(
                        "{} IN ({})",
                        predicate.column,
                        placeholders.join(", ")
                    ));
                }
                (comparison, value) => {
                    let placeholder = stmt.bind(value.clone());
                    clauses.push(format!(
                        "{} {} {}",
                        predicate.column,
                        comparison.to_sql(),
                        placeholder
                    ));
                }
            }
        }
        if let Some(raw) = &self.raw {
            clauses.push(raw.clone());
        }
        if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_filter_renders_always_true() {
        let mut stmt = SqlStatement::new();
        assert_eq!(Filter::all().render(&mut stmt), "1=1");
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_eq_predicate_binds_parameter() {
        let mut stmt = SqlStatement::new();
        let clause = Filter::eq("order_id", json!(42)).render(&mut stmt);
        assert_eq!(clause, "order_id = $1");
        assert_eq!(stmt.params(), &[json!(42)]);
    }

    #[test]
    fn test_in_predicate_expands_placeholders() {
        let mut stmt = SqlStatement::new();
        let filter = Filter::all().and("id", Comparison::In, json!([1, 2, 3]));
        let clause = filter.render(&mut stmt);
        assert_eq!(clause, "id IN ($1, $2, $3)");
        assert_eq!(stmt.params(), &[json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_raw_clause_is_appended() {
        let mut stmt = SqlStatement::new();
        let filter = Filter::eq("user_id", json!(7)).and_raw("status = 'active'");
        let clause = filter.render(&mut stmt);
        assert_eq!(clause, "user_id = $1 AND status = 'active'");
    }

    #[test]
    fn test_raw_only_filter() {
        let filter = Filter::raw("1=1");
        assert!(!filter.is_empty());
        assert_eq!(filter.raw_clause(), Some("1=1"));
        assert!(filter.predicates().is_empty());
    }
}
