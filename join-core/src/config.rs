//! Compiler configuration, optionally loaded from TOML.
//!
//! # Example Configuration
//!
//! ```toml
//! [pipeline]
//! identity_field = "_id"
//! id_field = "id"
//!
//! [mutation]
//! alias_policy = "strip"   # strip | retain | collapse
//!
//! [validation]
//! enabled = true
//! max_depth = 32
//! check_unique_fields = true
//! ```
//!
//! Every section and key is optional.

use serde::Deserialize;
use std::path::Path;

use crate::error::{JoinError, Result};
use crate::mutation::AliasPolicy;

/// Default nesting limit for validated trees.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Root configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JoinConfig {
    /// Field names used in emitted stages.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Post-query reshaping.
    #[serde(default)]
    pub mutation: MutationConfig,

    /// Upfront tree validation.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Field names the emitted stages refer to.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineConfig {
    /// Internal document identity, matched against bound variables.
    ///
    /// Default: `_id`
    #[serde(default = "default_identity_field")]
    pub identity_field: String,

    /// Externally visible field the identity is copied into.
    ///
    /// Default: `id`
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_identity_field() -> String {
    "_id".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identity_field: default_identity_field(),
            id_field: default_id_field(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MutationConfig {
    /// What happens to a relationship's alias field in result documents.
    #[serde(default)]
    pub alias_policy: AliasPolicy,
}

/// Checks run before compiling through [`crate::JoinBuilder`].
#[derive(Clone, Debug, Deserialize)]
pub struct ValidationConfig {
    /// Whether to validate at all. When disabled, malformed trees compile to
    /// malformed pipelines and the engine reports the problem.
    ///
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum relationship nesting depth.
    ///
    /// Default: 32
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Reject trees that reuse a `uniqueField` alias.
    ///
    /// Default: `true`
    #[serde(default = "default_true")]
    pub check_unique_fields: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: DEFAULT_MAX_DEPTH,
            check_unique_fields: true,
        }
    }
}

impl JoinConfig {
    /// Load configuration from a TOML file.
    ///
    /// Unlike an implicit project config, a path handed in explicitly must
    /// exist and parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded join config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: JoinConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Reject values no pipeline could use.
    pub fn check(&self) -> Result<()> {
        if self.pipeline.identity_field.is_empty() {
            return Err(JoinError::Config {
                message: "pipeline.identity_field must not be empty".to_string(),
            });
        }
        if self.pipeline.id_field.is_empty() {
            return Err(JoinError::Config {
                message: "pipeline.id_field must not be empty".to_string(),
            });
        }
        if self.validation.max_depth == 0 {
            return Err(JoinError::Config {
                message: "validation.max_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
