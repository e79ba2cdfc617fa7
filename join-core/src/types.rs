//! Data model for relationship filter trees.
//!
//! A tree is built by the query parser once per query: the root is the anchor
//! collection, every other node is a joined collection reached through a
//! foreign-key field on its parent.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

/// How a joined collection hangs off its parent document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipInfo {
    /// Collection to join.
    #[serde(default)]
    pub from: String,
    /// Field on the parent document holding the foreign reference(s).
    #[serde(default)]
    pub field: String,
    /// Whether `field` holds a list of references.
    #[serde(default)]
    pub many: bool,
    /// Alias the joined documents are attached under. Must be unique across
    /// the whole tree; this crate threads it through without checking unless
    /// validation is requested.
    #[serde(default)]
    pub unique_field: String,
}

impl RelationshipInfo {
    pub fn new(
        from: impl Into<String>,
        field: impl Into<String>,
        many: bool,
        unique_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            field: field.into(),
            many,
            unique_field: unique_field.into(),
        }
    }

    pub fn to_one(
        from: impl Into<String>,
        field: impl Into<String>,
        unique_field: impl Into<String>,
    ) -> Self {
        Self::new(from, field, false, unique_field)
    }

    pub fn to_many(
        from: impl Into<String>,
        field: impl Into<String>,
        unique_field: impl Into<String>,
    ) -> Self {
        Self::new(from, field, true, unique_field)
    }

    /// Name of the `$lookup` variable bound to the parent's reference field.
    pub fn variable_name(&self) -> String {
        if self.many {
            format!("{}_ids", self.unique_field)
        } else {
            format!("{}_id", self.unique_field)
        }
    }
}

/// One level of the filter tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipNode {
    /// Filter expression for this level, copied verbatim into a `$match` stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_term: Option<Value>,
    /// Join description. `None` on the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_info: Option<RelationshipInfo>,
    /// Stages appended after this level's own stages.
    #[serde(default)]
    pub post_join_pipeline: Vec<Value>,
    /// Nested joins, in emission order.
    #[serde(default)]
    pub relationships: Relationships,
}

impl RelationshipNode {
    /// The anchor node of a query.
    pub fn root() -> Self {
        Self::default()
    }

    /// A joined node.
    pub fn related(info: RelationshipInfo) -> Self {
        Self {
            relationship_info: Some(info),
            ..Self::default()
        }
    }

    pub fn with_match_term(mut self, match_term: Value) -> Self {
        self.match_term = Some(match_term);
        self
    }

    pub fn with_post_join_pipeline(mut self, stages: Vec<Value>) -> Self {
        self.post_join_pipeline = stages;
        self
    }

    pub fn with_relationship(mut self, key: impl Into<String>, node: RelationshipNode) -> Self {
        self.relationships.insert(key, node);
        self
    }

    /// Load a tree from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Number of relationship nodes below this one.
    pub fn relationship_count(&self) -> usize {
        self.relationships
            .iter()
            .map(|(_, child)| 1 + child.relationship_count())
            .sum()
    }

    /// Height of the relationship tree below this node (0 for a leaf).
    pub fn depth(&self) -> usize {
        self.relationships
            .iter()
            .map(|(_, child)| 1 + child.depth())
            .max()
            .unwrap_or(0)
    }
}

/// Insertion-ordered mapping from opaque relationship keys to child nodes.
///
/// Iteration order decides the order join stages are emitted in, so this is
/// an association list rather than a hash map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relationships {
    entries: Vec<(String, RelationshipNode)>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a child. Re-inserting an existing key replaces the node but
    /// keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, node: RelationshipNode) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = node,
            None => self.entries.push((key, node)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&RelationshipNode> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelationshipNode)> {
        self.entries.iter().map(|(k, node)| (k.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, RelationshipNode)> for Relationships {
    fn from_iter<I: IntoIterator<Item = (K, RelationshipNode)>>(iter: I) -> Self {
        let mut relationships = Relationships::new();
        for (key, node) in iter {
            relationships.insert(key, node);
        }
        relationships
    }
}

impl Serialize for Relationships {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Relationships {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RelationshipsVisitor;

        impl<'de> Visitor<'de> for RelationshipsVisitor {
            type Value = Relationships;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of relationship keys to relationship nodes")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut relationships = Relationships::new();
                while let Some((key, node)) = access.next_entry::<String, RelationshipNode>()? {
                    relationships.insert(key, node);
                }
                Ok(relationships)
            }
        }

        deserializer.deserialize_map(RelationshipsVisitor)
    }
}
