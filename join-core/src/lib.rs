//! Join Core - compiles relationship filter trees into MongoDB aggregation pipelines.
//!
//! A query parser turns an API-level filter into a [`RelationshipNode`] tree.
//! This crate turns that tree into:
//!
//! - **a pipeline**: nested `$lookup` stages (one per relationship, each with a
//!   correlated sub-pipeline), the node's `$match`, an `$addFields` copying
//!   `_id` to `id`, and any caller-supplied trailing stages
//! - **a post-query mutation**: a function reshaping the documents the engine
//!   returns, folding away the aliases the joins attached
//!
//! Nothing here talks to a database. Both compilers are pure and total; the
//! [`JoinBuilder`] facade adds optional validation and configuration.
//!
//! # Usage
//!
//! ```
//! use join_core::{pipeline_builder, RelationshipInfo, RelationshipNode};
//! use serde_json::json;
//!
//! let tree = RelationshipNode::root()
//!     .with_match_term(json!({ "$expr": { "$eq": [{ "$size": "$abc123_author" }, 1] } }))
//!     .with_relationship(
//!         "abc123",
//!         RelationshipNode::related(RelationshipInfo::to_one("users", "author", "abc123_author"))
//!             .with_match_term(json!({ "name": { "$eq": "Alice" } })),
//!     );
//!
//! let pipeline = pipeline_builder(&tree);
//! assert_eq!(pipeline.len(), 3);
//! ```

pub mod config;
pub mod error;
pub mod mutation;
pub mod pipeline;
pub mod stage;
pub mod types;
pub mod validate;

use serde_json::Value;

pub use config::JoinConfig;
pub use error::{JoinError, Result};
pub use mutation::{mutation_builder, AliasPolicy, MutationFn, PostQueryMutation};
pub use pipeline::{pipeline_builder, PipelineCompiler};
pub use stage::{stages_to_json, Lookup, Stage};
pub use types::{RelationshipInfo, RelationshipNode, Relationships};
pub use validate::validate;

/// Configured entry point producing pipelines and mutations together.
#[derive(Clone, Debug)]
pub struct JoinBuilder {
    config: JoinConfig,
    compiler: PipelineCompiler,
}

impl Default for JoinBuilder {
    fn default() -> Self {
        let config = JoinConfig::default();
        let compiler = PipelineCompiler::from_config(&config.pipeline);
        Self { config, compiler }
    }
}

impl JoinBuilder {
    pub fn new(config: JoinConfig) -> Result<Self> {
        config.check()?;
        let compiler = PipelineCompiler::from_config(&config.pipeline);
        Ok(Self { config, compiler })
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Compile the pipeline for `root`, validating first if enabled.
    pub fn pipeline(&self, root: &RelationshipNode) -> Result<Vec<Stage>> {
        self.check_tree(root)?;
        Ok(self.compiler.compile(root))
    }

    /// Compile the post-query mutation for a relationship map.
    pub fn mutation(&self, relationships: &Relationships) -> PostQueryMutation {
        PostQueryMutation::compile(relationships, self.config.mutation.alias_policy)
    }

    /// Compile both artifacts for `root`.
    pub fn build(&self, root: &RelationshipNode) -> Result<JoinPlan> {
        let pipeline = self.pipeline(root)?;
        let mutation = self.mutation(&root.relationships);

        tracing::debug!(
            relationships = root.relationship_count(),
            depth = root.depth(),
            stages = pipeline.len(),
            alias_policy = ?mutation.policy(),
            "Built join plan"
        );

        Ok(JoinPlan { pipeline, mutation })
    }

    fn check_tree(&self, root: &RelationshipNode) -> Result<()> {
        if self.config.validation.enabled {
            validate(root, &self.config.validation)?;
        }
        Ok(())
    }
}

/// A compiled query: the pipeline to run and the mutation for its results.
#[derive(Clone, Debug)]
pub struct JoinPlan {
    pub pipeline: Vec<Stage>,
    pub mutation: PostQueryMutation,
}

impl JoinPlan {
    pub fn pipeline_json(&self) -> Value {
        stages_to_json(&self.pipeline)
    }

    /// Hand the pipeline to `aggregate` (the engine) and reshape what it returns.
    pub fn run<F, E>(&self, aggregate: F) -> std::result::Result<Vec<Value>, E>
    where
        F: FnOnce(&[Stage]) -> std::result::Result<Vec<Value>, E>,
    {
        let documents = aggregate(&self.pipeline)?;
        Ok(self.mutation.apply(&documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> RelationshipNode {
        RelationshipNode::root()
            .with_match_term(json!({ "$expr": { "$gt": [{ "$size": "$abc123_posts" }, 0] } }))
            .with_relationship(
                "abc123",
                RelationshipNode::related(RelationshipInfo::to_many("posts", "posts", "abc123_posts")),
            )
    }

    #[test]
    fn test_build_and_run() {
        let builder = JoinBuilder::default();
        assert_eq!(builder.config().mutation.alias_policy, AliasPolicy::Strip);

        let plan = builder.build(&tree()).unwrap();
        assert_eq!(plan.pipeline.len(), 3);
        assert_eq!(plan.pipeline_json(), stages_to_json(&plan.pipeline));
        assert_eq!(
            plan.pipeline_json()[0]["$lookup"]["as"],
            json!("abc123_posts")
        );

        let out = plan
            .run(|pipeline| {
                assert_eq!(pipeline.len(), 3);
                Ok::<_, String>(vec![json!({ "name": "a", "abc123_posts": [{ "title": "x" }] })])
            })
            .unwrap();
        assert_eq!(out, vec![json!({ "name": "a" })]);
    }

    #[test]
    fn test_run_propagates_engine_error() {
        let plan = JoinBuilder::default().build(&tree()).unwrap();
        let err = plan.run(|_| Err::<Vec<Value>, _>("engine down")).unwrap_err();
        assert_eq!(err, "engine down");
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let broken = RelationshipNode::root().with_relationship("x", RelationshipNode::root());

        assert!(JoinBuilder::default().pipeline(&broken).is_err());

        let mut config = JoinConfig::default();
        config.validation.enabled = false;
        let builder = JoinBuilder::new(config).unwrap();
        assert_eq!(builder.pipeline(&broken).unwrap().len(), 2);
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let mut config = JoinConfig::default();
        config.pipeline.identity_field.clear();
        assert!(matches!(JoinBuilder::new(config), Err(JoinError::Config { .. })));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = JoinConfig::default();
        config.mutation.alias_policy = AliasPolicy::Retain;
        let builder = JoinBuilder::new(config).unwrap();
        assert_eq!(builder.config().mutation.alias_policy, AliasPolicy::Retain);
        let plan = builder.build(&tree()).unwrap();

        let doc = json!({ "abc123_posts": [{ "title": "x" }] });
        assert_eq!(plan.mutation.apply(&[doc.clone()]), vec![doc]);
    }
}
