// src/query/compiler.rs
//! Compiles search clauses plus declared joins into an aggregation pipeline
//!
//! ```text
//! SearchClause ──► $match (AND of field equality)
//! JoinRegistry ──► $lookup per join whose left side is the target, in order
//! ```
//!
//! Compilation never touches the store. Dropped duplicate clause fields are
//! warned about here, once each. Two joins from the same left collection into
//! the same right collection would share one `<left>_<right>` output field;
//! the first registered join keeps it and later ones are skipped with a
//! warning.

use crate::aggregation::{LookupStage, MatchStage, Pipeline};
use crate::document::{CollectionName, Record};
use crate::error::{JoinBaseError, Result};
use crate::join_registry::JoinRegistry;
use crate::{log_debug, log_warn};
use crate::logging::Logger;
use crate::query::SearchClause;

#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    logger: Logger,
}

impl QueryCompiler {
    pub fn new(logger: Logger) -> Self {
        QueryCompiler { logger }
    }

    /// Pipeline searching the collection of `R`
    pub fn compile<R: Record>(
        &self,
        clauses: &SearchClause,
        registry: &JoinRegistry,
    ) -> Result<Pipeline> {
        self.compile_for(&R::collection_name(), clauses, registry)
    }

    /// Pipeline searching `target`
    pub fn compile_for(
        &self,
        target: &CollectionName,
        clauses: &SearchClause,
        registry: &JoinRegistry,
    ) -> Result<Pipeline> {
        for (field, _) in clauses.iter() {
            validate_field(field)?;
        }
        for field in clauses.duplicates() {
            log_warn!(
                self.logger,
                "Duplicate fields found in the search clause for field '{}'",
                field
            );
        }

        let match_stage = MatchStage::new(clauses.to_conditions());
        let mut lookups: Vec<LookupStage> = Vec::new();
        for join in registry.joins_for(target) {
            let lookup = LookupStage::from_join(&join);
            if let Some(kept) = lookups.iter().find(|l| l.as_field() == lookup.as_field()) {
                log_warn!(
                    self.logger,
                    "Join {}.{} -> {}.{} skipped: '{}' is already filled from {}.{}",
                    join.left_collection,
                    join.left_field,
                    join.right_collection,
                    join.right_field,
                    lookup.as_field(),
                    kept.from(),
                    kept.foreign_field()
                );
                continue;
            }
            lookups.push(lookup);
        }

        let pipeline = Pipeline::new(match_stage, lookups);
        log_debug!(
            self.logger,
            "Compiled pipeline for '{}': {}",
            target,
            pipeline.to_json()
        );
        Ok(pipeline)
    }
}

fn validate_field(field: &str) -> Result<()> {
    if field.is_empty() {
        return Err(JoinBaseError::InvalidClause(
            "Field name cannot be empty".to_string(),
        ));
    }
    if field.starts_with('$') {
        return Err(JoinBaseError::InvalidClause(format!(
            "Field name '{}' cannot start with '$'",
            field
        )));
    }
    if field.contains('\0') {
        return Err(JoinBaseError::InvalidClause(
            "Field name cannot contain NUL".to_string(),
        ));
    }
    Ok(())
}
