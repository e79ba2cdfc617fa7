//! Upfront structural checks for relationship trees.
//!
//! The compilers accept anything; this catches the mistakes that would
//! otherwise only surface when the engine rejects the pipeline.

use std::collections::HashSet;

use crate::config::ValidationConfig;
use crate::error::{JoinError, Result};
use crate::types::{RelationshipNode, Relationships};

/// Check `root` against the structural invariants of a relationship tree.
///
/// Stops at the first problem found, walking relationships in insertion order.
pub fn validate(root: &RelationshipNode, config: &ValidationConfig) -> Result<()> {
    if root.relationship_info.is_some() {
        return Err(JoinError::RootHasRelationshipInfo);
    }

    let mut aliases = HashSet::new();
    validate_relationships(&root.relationships, "", 1, config, &mut aliases)
}

fn validate_relationships(
    relationships: &Relationships,
    parent_path: &str,
    depth: usize,
    config: &ValidationConfig,
    aliases: &mut HashSet<String>,
) -> Result<()> {
    for (key, child) in relationships.iter() {
        let path = if parent_path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", parent_path, key)
        };

        if depth > config.max_depth {
            return Err(JoinError::DepthExceeded {
                path,
                max_depth: config.max_depth,
            });
        }

        let Some(info) = &child.relationship_info else {
            return Err(JoinError::MissingRelationshipInfo { path });
        };

        let required = [
            ("from", &info.from),
            ("field", &info.field),
            ("uniqueField", &info.unique_field),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(JoinError::EmptyRelationshipField {
                path,
                field: *field,
            });
        }

        if config.check_unique_fields && !aliases.insert(info.unique_field.clone()) {
            return Err(JoinError::DuplicateUniqueField {
                unique_field: info.unique_field.clone(),
                path,
            });
        }

        validate_relationships(&child.relationships, &path, depth + 1, config, aliases)?;
    }

    Ok(())
}
