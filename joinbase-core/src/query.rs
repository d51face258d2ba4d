// src/query.rs
//! Search clauses
//!
//! A search is a set of `field = value` equality constraints. They can be
//! built programmatically or parsed from the textual form
//! `field=value[&field=value...]`. A field may appear only once: the first
//! occurrence wins and later ones are dropped and kept in `duplicates()`;
//! the compiler warns about each of them.
//!
//! ```ignore
//! let clauses = SearchClause::parse("role=admin&locale=en-AU")?;
//! let pipeline = QueryCompiler::new(logger).compile::<User>(&clauses, &registry)?;
//! ```

pub mod compiler;

use serde_json::Value;

use crate::error::{JoinBaseError, Result};

pub use compiler::QueryCompiler;

/// Ordered field -> value equality constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchClause {
    fields: Vec<(String, String)>,
    duplicates: Vec<String>,
}

impl SearchClause {
    /// Empty clause set (matches every document)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint. Returns `false` and records the field as a duplicate
    /// if it is already constrained; the existing value is kept.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) -> bool {
        let field = field.into();
        if self.get(&field).is_some() {
            self.duplicates.push(field);
            return false;
        }
        self.fields.push((field, value.into()));
        true
    }

    /// Builder form of `insert`
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Build from pairs in order; later duplicates are dropped
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut clause = SearchClause::new();
        for (field, value) in pairs {
            clause.insert(field, value);
        }
        clause
    }

    /// Parse `field=value[&field=value...]`.
    ///
    /// Whitespace around each clause and around the field name is ignored;
    /// the value is taken verbatim after the first `=`. Field names are made
    /// of letters, digits, `_` and `.` (nested path). An empty input yields
    /// an empty clause set.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(SearchClause::new());
        }

        let mut pairs = Vec::new();
        for part in text.split('&') {
            let part = part.trim();
            let Some((field, value)) = part.split_once('=') else {
                return Err(JoinBaseError::InvalidClause(format!(
                    "Expected field=value, got '{}'",
                    part
                )));
            };

            let field = field.trim();
            if field.is_empty()
                || !field
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
            {
                return Err(JoinBaseError::InvalidClause(format!(
                    "Invalid field name '{}'",
                    field
                )));
            }
            if value.is_empty() {
                return Err(JoinBaseError::InvalidClause(format!(
                    "Missing value for field '{}'",
                    field
                )));
            }
            pairs.push((field, value));
        }

        Ok(Self::from_pairs(pairs))
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Constraints in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Fields that were dropped because they were already constrained
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Constraints as `$match` conditions with string values
    pub(crate) fn to_conditions(&self) -> Vec<(String, Value)> {
        self.fields
            .iter()
            .map(|(f, v)| (f.clone(), Value::String(v.clone())))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
