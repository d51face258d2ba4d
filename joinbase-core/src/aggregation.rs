// src/aggregation.rs
// Aggregation pipeline: one $match stage followed by $lookup stages

use serde_json::{json, Map, Value};

use crate::document::CollectionName;
use crate::error::{JoinBaseError, Result};
use crate::join_registry::JoinDefinition;
use crate::value_utils::{field_matches, get_nested_value};

/// Aggregation pipeline
///
/// The match stage always comes first; lookups run against documents that
/// survived it, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    match_stage: MatchStage,
    lookups: Vec<LookupStage>,
}

/// Pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(MatchStage),
    Lookup(LookupStage),
}

/// $match stage - conjunction of field equality tests
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchStage {
    conditions: Vec<(String, Value)>,
}

/// $lookup stage - attach documents of another collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupStage {
    from: CollectionName,
    local_field: String,
    foreign_field: String,
    as_field: String,
}

impl Pipeline {
    pub fn new(match_stage: MatchStage, lookups: Vec<LookupStage>) -> Self {
        Pipeline {
            match_stage,
            lookups,
        }
    }

    /// Create pipeline from JSON array.
    ///
    /// This is the single validation point for pipelines handed to a store:
    /// any shape the store cannot execute is a `QueryFailure` here.
    pub fn from_json(pipeline_json: &Value) -> Result<Self> {
        let Value::Array(stages_array) = pipeline_json else {
            return Err(JoinBaseError::QueryFailure(
                "Pipeline must be an array".to_string(),
            ));
        };

        let mut stages = stages_array.iter().map(Stage::from_json);
        let match_stage = match stages.next() {
            Some(Ok(Stage::Match(stage))) => stage,
            Some(Ok(Stage::Lookup(_))) => {
                return Err(JoinBaseError::QueryFailure(
                    "First pipeline stage must be $match".to_string(),
                ))
            }
            Some(Err(err)) => return Err(err),
            None => {
                return Err(JoinBaseError::QueryFailure(
                    "Pipeline cannot be empty".to_string(),
                ))
            }
        };

        let mut lookups = Vec::new();
        for stage in stages {
            match stage? {
                Stage::Lookup(lookup) => lookups.push(lookup),
                Stage::Match(_) => {
                    return Err(JoinBaseError::QueryFailure(
                        "$match may only appear as the first stage".to_string(),
                    ))
                }
            }
        }

        Ok(Pipeline {
            match_stage,
            lookups,
        })
    }

    /// MongoDB JSON form of the pipeline
    pub fn to_json(&self) -> Value {
        let mut stages = vec![self.match_stage.to_json()];
        stages.extend(self.lookups.iter().map(LookupStage::to_json));
        Value::Array(stages)
    }

    pub fn match_stage(&self) -> &MatchStage {
        &self.match_stage
    }

    pub fn lookups(&self) -> &[LookupStage] {
        &self.lookups
    }

    /// All stages in execution order
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::Match(self.match_stage.clone())];
        stages.extend(self.lookups.iter().cloned().map(Stage::Lookup));
        stages
    }

    /// Run the pipeline on one document.
    ///
    /// Returns `None` when the document fails the match stage, otherwise the
    /// document with one array field per lookup. `foreign` resolves a
    /// collection name to its documents.
    pub fn apply<'a, F>(&self, doc: &Value, foreign: F) -> Option<Value>
    where
        F: Fn(&CollectionName) -> &'a [Value],
    {
        if !self.match_stage.matches(doc) {
            return None;
        }

        let mut result = doc.clone();
        for lookup in &self.lookups {
            let joined = lookup.collect(doc, foreign(&lookup.from));
            if let Value::Object(ref mut map) = result {
                map.insert(lookup.as_field.clone(), Value::Array(joined));
            }
        }
        Some(result)
    }
}

impl Stage {
    /// Parse stage from JSON
    fn from_json(stage_json: &Value) -> Result<Self> {
        let Value::Object(obj) = stage_json else {
            return Err(JoinBaseError::QueryFailure(
                "Stage must be an object".to_string(),
            ));
        };

        // Each stage should have exactly one key
        let mut entries = obj.iter();
        let (stage_name, stage_spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(JoinBaseError::QueryFailure(
                    "Each stage must have exactly one operator".to_string(),
                ))
            }
        };

        match stage_name.as_str() {
            "$match" => Ok(Stage::Match(MatchStage::from_json(stage_spec)?)),
            "$lookup" => Ok(Stage::Lookup(LookupStage::from_json(stage_spec)?)),
            _ => Err(JoinBaseError::QueryFailure(format!(
                "Unknown pipeline stage: {}",
                stage_name
            ))),
        }
    }
}

impl MatchStage {
    /// Match stage accepting every document
    pub fn all() -> Self {
        MatchStage::default()
    }

    pub fn new(conditions: Vec<(String, Value)>) -> Self {
        MatchStage { conditions }
    }

    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(JoinBaseError::QueryFailure(
                "$match must be an object".to_string(),
            ));
        };

        let mut conditions = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            if field.is_empty() || field.starts_with('$') {
                return Err(JoinBaseError::QueryFailure(format!(
                    "Unsupported $match field: '{}'",
                    field
                )));
            }
            if value.is_object() {
                return Err(JoinBaseError::QueryFailure(format!(
                    "Only field equality is supported in $match (field '{}')",
                    field
                )));
            }
            conditions.push((field.clone(), value.clone()));
        }

        Ok(MatchStage { conditions })
    }

    fn to_json(&self) -> Value {
        let filter: Map<String, Value> = self.conditions.iter().cloned().collect();
        json!({ "$match": filter })
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Every condition's field must exist and equal the expected value
    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            get_nested_value(doc, field).is_some_and(|actual| field_matches(actual, expected))
        })
    }
}

impl LookupStage {
    pub fn new(
        from: CollectionName,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        LookupStage {
            from,
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        }
    }

    /// Lookup for a declared join, output under `<left>_<right>`
    pub fn from_join(join: &JoinDefinition) -> Self {
        LookupStage::new(
            join.right_collection.clone(),
            join.left_field.clone(),
            join.right_field.clone(),
            join.output_field(),
        )
    }

    fn from_json(spec: &Value) -> Result<Self> {
        let Value::Object(obj) = spec else {
            return Err(JoinBaseError::QueryFailure(
                "$lookup must be an object".to_string(),
            ));
        };

        let field = |key: &str| -> Result<String> {
            obj.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    JoinBaseError::QueryFailure(format!("$lookup requires a string '{}'", key))
                })
        };

        let from = CollectionName::new(field("from")?);
        if !from.is_valid() {
            return Err(JoinBaseError::QueryFailure(format!(
                "Invalid $lookup collection: '{}'",
                from
            )));
        }
        let as_field = field("as")?;
        if as_field.starts_with('$') {
            return Err(JoinBaseError::QueryFailure(format!(
                "Invalid $lookup output field: '{}'",
                as_field
            )));
        }

        Ok(LookupStage {
            from,
            local_field: field("localField")?,
            foreign_field: field("foreignField")?,
            as_field,
        })
    }

    fn to_json(&self) -> Value {
        json!({
            "$lookup": {
                "from": self.from.as_str(),
                "localField": self.local_field,
                "foreignField": self.foreign_field,
                "as": self.as_field,
            }
        })
    }

    pub fn from(&self) -> &CollectionName {
        &self.from
    }

    pub fn local_field(&self) -> &str {
        &self.local_field
    }

    pub fn foreign_field(&self) -> &str {
        &self.foreign_field
    }

    pub fn as_field(&self) -> &str {
        &self.as_field
    }

    /// Foreign documents whose `foreign_field` equals the local value.
    ///
    /// A missing or null local value joins nothing. An array local value
    /// joins documents matching any of its elements.
    pub fn collect(&self, doc: &Value, foreign_docs: &[Value]) -> Vec<Value> {
        let local = match get_nested_value(doc, &self.local_field) {
            None | Some(Value::Null) => return Vec::new(),
            Some(value) => value,
        };

        foreign_docs
            .iter()
            .filter(|foreign| {
                let Some(foreign_value) = get_nested_value(foreign, &self.foreign_field) else {
                    return false;
                };
                match local {
                    Value::Array(items) => items
                        .iter()
                        .any(|item| field_matches(foreign_value, item)),
                    scalar => field_matches(foreign_value, scalar),
                }
            })
            .cloned()
            .collect()
    }
}
