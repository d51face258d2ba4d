// src/join_registry.rs
//! Declared left joins between collections
//!
//! Joins are registered at setup time and read once per compiled query. The
//! list is append-only and keeps registration order; `joins_for` is a linear
//! scan, which is fine at the tens-of-entries scale joins are declared at.

use parking_lot::RwLock;

use crate::document::{CollectionName, Record};

/// `left_collection.left_field == right_collection.right_field`
///
/// Field names are not checked at registration; a field that is missing at
/// query time produces an empty join array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinDefinition {
    pub left_collection: CollectionName,
    pub left_field: String,
    pub right_collection: CollectionName,
    pub right_field: String,
}

impl JoinDefinition {
    pub fn new(
        left_collection: CollectionName,
        left_field: impl Into<String>,
        right_collection: CollectionName,
        right_field: impl Into<String>,
    ) -> Self {
        JoinDefinition {
            left_collection,
            left_field: left_field.into(),
            right_collection,
            right_field: right_field.into(),
        }
    }

    /// Array field the joined documents are attached under
    pub fn output_field(&self) -> String {
        self.left_collection.joined_field(&self.right_collection)
    }
}

#[derive(Debug, Default)]
pub struct JoinRegistry {
    joins: RwLock<Vec<JoinDefinition>>,
}

impl JoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `L.left_field == R.right_field`
    pub fn register<L: Record, R: Record>(&self, left_field: &str, right_field: &str) {
        self.register_names(
            L::collection_name(),
            left_field,
            R::collection_name(),
            right_field,
        );
    }

    /// Same as `register` for collections only known by name
    pub fn register_names(
        &self,
        left_collection: CollectionName,
        left_field: &str,
        right_collection: CollectionName,
        right_field: &str,
    ) {
        self.joins.write().push(JoinDefinition::new(
            left_collection,
            left_field,
            right_collection,
            right_field,
        ));
    }

    /// Every join whose left side is `collection`, in registration order
    pub fn joins_for(&self, collection: &CollectionName) -> Vec<JoinDefinition> {
        self.joins
            .read()
            .iter()
            .filter(|join| &join.left_collection == collection)
            .cloned()
            .collect()
    }

    /// Snapshot of all registered joins
    pub fn all(&self) -> Vec<JoinDefinition> {
        self.joins.read().clone()
    }

    pub fn len(&self) -> usize {
        self.joins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.read().is_empty()
    }
}
