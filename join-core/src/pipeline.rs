//! Relationship tree -> aggregation pipeline compiler.
//!
//! Each node compiles to:
//!
//! ```text
//! [$lookup per relationship, in insertion order]
//! [$match <matchTerm>]            (only when a match term is present)
//! $addFields { id: "$_id" }
//! [postJoinPipeline stages]
//! ```
//!
//! A relationship's own stages are compiled recursively into the inner
//! pipeline of its `$lookup`, after the correlation filter, so the output
//! nests exactly as deep as the input tree.

use serde_json::{json, Map, Value};
use std::borrow::Cow;

use crate::config::PipelineConfig;
use crate::stage::{Lookup, Stage};
use crate::types::{RelationshipInfo, RelationshipNode};

/// Compiles relationship trees into pipeline stages.
///
/// Total over any tree: nothing is validated here.
#[derive(Clone, Debug)]
pub struct PipelineCompiler {
    identity_field: String,
    id_field: String,
}

impl Default for PipelineCompiler {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl PipelineCompiler {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            identity_field: config.identity_field.clone(),
            id_field: config.id_field.clone(),
        }
    }

    /// Compile `node` and everything below it.
    pub fn compile(&self, node: &RelationshipNode) -> Vec<Stage> {
        let mut stages =
            Vec::with_capacity(node.relationships.len() + node.post_join_pipeline.len() + 2);

        for (key, child) in node.relationships.iter() {
            stages.push(Stage::Lookup(self.lookup(key, child)));
        }

        if let Some(match_term) = &node.match_term {
            stages.push(Stage::Match(match_term.clone()));
        }

        stages.push(Stage::copy_field(&self.identity_field, &self.id_field));
        stages.extend(node.post_join_pipeline.iter().cloned().map(Stage::Raw));

        stages
    }

    fn lookup(&self, key: &str, child: &RelationshipNode) -> Lookup {
        let info = match &child.relationship_info {
            Some(info) => Cow::Borrowed(info),
            None => {
                tracing::warn!(
                    "Relationship '{}' has no relationshipInfo; emitting an incomplete $lookup",
                    key
                );
                Cow::Owned(RelationshipInfo::default())
            }
        };

        let variable = info.variable_name();
        let local_field = format!("${}", info.field);
        let (bound_value, correlation) = if info.many {
            (
                json!({ "$ifNull": [local_field, []] }),
                Stage::match_identity_in(&self.identity_field, &variable),
            )
        } else {
            (
                Value::String(local_field),
                Stage::match_identity(&self.identity_field, &variable),
            )
        };

        let mut bindings = Map::new();
        bindings.insert(variable, bound_value);

        let mut pipeline = vec![correlation];
        pipeline.extend(self.compile(child));

        tracing::trace!(
            key,
            from = %info.from,
            alias = %info.unique_field,
            many = info.many,
            inner_stages = pipeline.len(),
            "Emitted $lookup"
        );

        Lookup {
            from: info.from.clone(),
            alias: info.unique_field.clone(),
            bindings,
            pipeline,
        }
    }
}

/// Compile a tree with the default field names (`_id` -> `id`).
pub fn pipeline_builder(node: &RelationshipNode) -> Vec<Stage> {
    let stages = PipelineCompiler::default().compile(node);
    tracing::debug!(
        relationships = node.relationship_count(),
        stages = stages.len(),
        "Compiled pipeline"
    );
    stages
}
