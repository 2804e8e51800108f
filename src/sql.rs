//! Parameterized SQL statement construction
//!
//! Raw statements handed to the data store adapter carry their dynamic
//! values as bound parameters, never spliced into the SQL text. Placeholders
//! use the `$n` style.

use serde_json::Value;

/// A SQL statement with positional `$n` placeholders and bound parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlStatement {
    sql: String,
    params: Vec<Value>,
}

impl SqlStatement {
    /// Create an empty statement
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw SQL fragment
    pub fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Bind a parameter and return its placeholder (`$1`, `$2`, ...)
    pub fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    /// Bind a parameter and append its placeholder to the SQL text
    pub fn push_bound(&mut self, value: Value) {
        let placeholder = self.bind(value);
        self.sql.push_str(&placeholder);
    }

    /// The SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound parameters, in placeholder order
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Decompose into SQL text and parameters
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}
