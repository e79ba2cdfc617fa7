//! Post-query reshaping of result documents.
//!
//! The pipeline attaches joined documents under each relationship's
//! `uniqueField` alias. Once the engine has evaluated the match terms that
//! reference those aliases, the compiled mutation walks the same relationship
//! shape over the results, depth first, and folds each alias back according
//! to an [`AliasPolicy`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Relationships;

/// What to do with a relationship's alias field in result documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasPolicy {
    /// Drop the alias field. Joined data only exists to evaluate filters.
    #[default]
    Strip,
    /// Keep the alias field with its nested relationships reshaped.
    Retain,
    /// As `Retain`, but to-one aliases become a single document (or `null`
    /// when the joined array is empty). An alias missing from a document
    /// stays missing; no `null` is written for it.
    Collapse,
}

/// Boxed form of a compiled mutation.
pub type MutationFn = Box<dyn Fn(&[Value]) -> Vec<Value> + Send + Sync>;

#[derive(Clone, Debug)]
struct RelationshipMutation {
    alias: String,
    many: bool,
    nested: Vec<RelationshipMutation>,
}

/// A compiled reshaping of result documents.
///
/// Applying it never touches the input; every call builds new documents.
#[derive(Clone, Debug)]
pub struct PostQueryMutation {
    policy: AliasPolicy,
    steps: Vec<RelationshipMutation>,
}

impl PostQueryMutation {
    pub fn compile(relationships: &Relationships, policy: AliasPolicy) -> Self {
        Self {
            policy,
            steps: compile_steps(relationships),
        }
    }

    pub fn policy(&self) -> AliasPolicy {
        self.policy
    }

    /// True when there are no relationships to reshape.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn apply(&self, documents: &[Value]) -> Vec<Value> {
        documents
            .iter()
            .map(|doc| reshape_document(doc, &self.steps, self.policy))
            .collect()
    }

    pub fn into_fn(self) -> MutationFn {
        Box::new(move |documents| self.apply(documents))
    }
}

fn compile_steps(relationships: &Relationships) -> Vec<RelationshipMutation> {
    relationships
        .iter()
        .filter_map(|(key, child)| match &child.relationship_info {
            Some(info) => Some(RelationshipMutation {
                alias: info.unique_field.clone(),
                many: info.many,
                nested: compile_steps(&child.relationships),
            }),
            None => {
                tracing::warn!("Relationship '{}' has no relationshipInfo; skipping its mutation", key);
                None
            }
        })
        .collect()
}

/// Rebuild one document, folding every alias that has a compiled step.
/// Field order is preserved. Aliases missing from the document are empty
/// branches and leave it untouched.
fn reshape_document(doc: &Value, steps: &[RelationshipMutation], policy: AliasPolicy) -> Value {
    let Value::Object(fields) = doc else {
        return doc.clone();
    };
    if steps.is_empty() {
        return doc.clone();
    }

    let mut out = Map::with_capacity(fields.len());
    for (key, value) in fields {
        match steps.iter().find(|step| step.alias == *key) {
            Some(step) => {
                if let Some(folded) = step.fold(value, policy) {
                    out.insert(key.clone(), folded);
                }
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

impl RelationshipMutation {
    fn fold(&self, joined: &Value, policy: AliasPolicy) -> Option<Value> {
        match policy {
            AliasPolicy::Strip => None,
            AliasPolicy::Retain => Some(self.reshape_joined(joined, policy)),
            AliasPolicy::Collapse => {
                let reshaped = self.reshape_joined(joined, policy);
                if self.many {
                    return Some(reshaped);
                }
                match reshaped {
                    Value::Array(mut docs) => {
                        if docs.len() > 1 {
                            tracing::warn!(
                                alias = %self.alias,
                                count = docs.len(),
                                "To-one relationship joined more than one document; keeping the first"
                            );
                        }
                        docs.truncate(1);
                        Some(docs.pop().unwrap_or(Value::Null))
                    }
                    other => Some(other),
                }
            }
        }
    }

    fn reshape_joined(&self, joined: &Value, policy: AliasPolicy) -> Value {
        match joined {
            Value::Array(docs) => Value::Array(
                docs.iter()
                    .map(|doc| reshape_document(doc, &self.nested, policy))
                    .collect(),
            ),
            other => reshape_document(other, &self.nested, policy),
        }
    }
}

/// Compile a mutation that strips every alias field.
pub fn mutation_builder(relationships: &Relationships) -> MutationFn {
    PostQueryMutation::compile(relationships, AliasPolicy::default()).into_fn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RelationshipInfo, RelationshipNode};
    use serde_json::json;

    fn tree() -> RelationshipNode {
        RelationshipNode::root()
            .with_relationship(
                "abc123",
                RelationshipNode::related(RelationshipInfo::to_one("users", "author", "abc123_author")),
            )
            .with_relationship(
                "def456",
                RelationshipNode::related(RelationshipInfo::to_many("posts", "posts", "def456_posts"))
                    .with_relationship(
                        "ghi789",
                        RelationshipNode::related(RelationshipInfo::to_many("tags", "tags", "ghi789_tags")),
                    ),
            )
    }

    fn result() -> Value {
        json!({
            "name": "foobar",
            "abc123_author": [{ "name": "Alice" }],
            "def456_posts": [
                { "title": "hello", "ghi789_tags": [{ "name": "React" }] },
                { "title": "world" },
            ],
            "age": 23,
        })
    }

    #[test]
    fn test_strip_removes_aliases() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Strip);
        let out = mutation.apply(&[result()]);

        assert_eq!(out, vec![json!({ "name": "foobar", "age": 23 })]);
    }

    #[test]
    fn test_retain_reshapes_nested() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Retain);
        let out = mutation.apply(&[result()]);

        assert_eq!(out, vec![result()]);
    }

    #[test]
    fn test_collapse_to_one() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Collapse);
        let out = mutation.apply(&[result(), json!({ "abc123_author": [] })]);

        assert_eq!(out[0]["abc123_author"], json!({ "name": "Alice" }));
        assert!(out[0]["def456_posts"].is_array());
        assert_eq!(out[1], json!({ "abc123_author": null }));
    }

    #[test]
    fn test_collapse_recurses_into_to_many() {
        let relationships = RelationshipNode::root()
            .with_relationship(
                "p",
                RelationshipNode::related(RelationshipInfo::to_many("posts", "posts", "p_posts"))
                    .with_relationship(
                        "a",
                        RelationshipNode::related(RelationshipInfo::to_one("users", "author", "a_author")),
                    ),
            )
            .relationships;
        let mutation = PostQueryMutation::compile(&relationships, AliasPolicy::Collapse);

        let doc = json!({ "p_posts": [{ "a_author": [{ "n": 1 }] }, { "a_author": [] }] });
        assert_eq!(
            mutation.apply(&[doc]),
            vec![json!({ "p_posts": [{ "a_author": { "n": 1 } }, { "a_author": null }] })]
        );
    }

    #[test]
    fn test_collapse_leaves_missing_alias_missing() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Collapse);
        let out = mutation.apply(&[json!({ "name": "quux", "def456_posts": [{ "title": "x" }] })]);

        assert_eq!(out, vec![json!({ "name": "quux", "def456_posts": [{ "title": "x" }] })]);
        assert!(out[0].get("abc123_author").is_none());
    }

    #[test]
    fn test_field_order_preserved() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Strip);
        let out = mutation.apply(&[result()]);

        let keys: Vec<_> = out[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "age"]);
    }

    #[test]
    fn test_absent_alias_is_empty_branch() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Retain);
        let doc = json!({ "name": "quux" });

        assert_eq!(mutation.apply(&[doc.clone()]), vec![doc]);
    }

    #[test]
    fn test_non_object_documents_pass_through() {
        let mutation = PostQueryMutation::compile(&tree().relationships, AliasPolicy::Strip);
        assert_eq!(mutation.apply(&[json!(42), Value::Null]), vec![json!(42), Value::Null]);
    }

    #[test]
    fn test_empty_relationships() {
        let mutation = PostQueryMutation::compile(&Relationships::new(), AliasPolicy::Strip);
        assert!(mutation.is_empty());
        assert_eq!(mutation.apply(&[result()]), vec![result()]);
    }

    #[test]
    fn test_policy_deserializes_lowercase() {
        let policy: AliasPolicy = serde_json::from_value(json!("retain")).unwrap();
        assert_eq!(policy, AliasPolicy::Retain);
    }
}
