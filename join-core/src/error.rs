//! Error types for join-core.

use thiserror::Error;

/// Result type alias for join-core operations.
pub type Result<T> = std::result::Result<T, JoinError>;

/// Errors that can occur while validating a relationship tree or loading configuration.
///
/// Compilation itself never fails; these only come out of the validating
/// paths (`validate`, `JoinBuilder`) and the config loader.
#[derive(Error, Debug)]
pub enum JoinError {
    /// The root node carries relationship info, so it would be treated as a joined collection.
    #[error("Root node must not have relationshipInfo")]
    RootHasRelationshipInfo,

    /// A non-root node has no relationship info.
    #[error("Relationship '{path}' is missing relationshipInfo")]
    MissingRelationshipInfo {
        /// Dotted key path from the root to the offending node.
        path: String,
    },

    /// A required relationship info field is empty.
    #[error("Relationship '{path}' has an empty '{field}'")]
    EmptyRelationshipField {
        /// Dotted key path from the root to the offending node.
        path: String,
        /// Name of the empty field as it appears in the input tree.
        field: &'static str,
    },

    /// Two relationships in the same tree use the same alias.
    #[error("uniqueField '{unique_field}' at '{path}' is already used elsewhere in the tree")]
    DuplicateUniqueField {
        /// The colliding alias.
        unique_field: String,
        /// Dotted key path of the second occurrence.
        path: String,
    },

    /// The tree nests deeper than the configured limit.
    #[error("Relationship '{path}' exceeds maximum nesting depth {max_depth}")]
    DepthExceeded {
        /// Dotted key path of the first node past the limit.
        path: String,
        /// Configured limit.
        max_depth: usize,
    },

    /// Invalid configuration values.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// IO error reading a config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error for config files.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parse error for relationship trees.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
