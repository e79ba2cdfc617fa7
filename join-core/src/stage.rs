//! Aggregation pipeline stages.
//!
//! Stages serialize to the exact document shapes the MongoDB aggregation
//! engine accepts; the output is handed to the engine unmodified.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// A single pipeline stage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Stage {
    /// `{ "$lookup": { from, as, let, pipeline } }`
    #[serde(rename = "$lookup")]
    Lookup(Lookup),
    /// `{ "$match": <expression> }`
    #[serde(rename = "$match")]
    Match(Value),
    /// `{ "$addFields": { ... } }`
    #[serde(rename = "$addFields")]
    AddFields(Map<String, Value>),
    /// A caller-supplied stage, emitted as given.
    #[serde(untagged)]
    Raw(Value),
}

/// Correlated-subquery `$lookup`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Lookup {
    pub from: String,
    #[serde(rename = "as")]
    pub alias: String,
    #[serde(rename = "let")]
    pub bindings: Map<String, Value>,
    pub pipeline: Vec<Stage>,
}

impl Stage {
    /// Filter keeping the document whose identity equals `$$variable`.
    pub fn match_identity(identity_field: &str, variable: &str) -> Self {
        Stage::Match(json!({
            "$expr": { "$eq": [format!("${}", identity_field), format!("$${}", variable)] }
        }))
    }

    /// Filter keeping documents whose identity appears in the `$$variable` list.
    pub fn match_identity_in(identity_field: &str, variable: &str) -> Self {
        Stage::Match(json!({
            "$expr": { "$in": [format!("${}", identity_field), format!("$${}", variable)] }
        }))
    }

    /// `{ "$addFields": { <target>: "$<source>" } }`
    pub fn copy_field(source: &str, target: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(target.to_string(), Value::String(format!("${}", source)));
        Stage::AddFields(fields)
    }

    /// The stage as a JSON document.
    pub fn to_document(&self) -> Value {
        match self {
            Stage::Lookup(lookup) => json!({ "$lookup": lookup.to_document() }),
            Stage::Match(expr) => json!({ "$match": expr }),
            Stage::AddFields(fields) => json!({ "$addFields": fields }),
            Stage::Raw(stage) => stage.clone(),
        }
    }

    pub fn as_lookup(&self) -> Option<&Lookup> {
        match self {
            Stage::Lookup(lookup) => Some(lookup),
            _ => None,
        }
    }
}

impl Lookup {
    fn to_document(&self) -> Value {
        json!({
            "from": self.from,
            "as": self.alias,
            "let": self.bindings,
            "pipeline": stages_to_json(&self.pipeline),
        })
    }
}

/// Render a pipeline as a JSON array of stage documents.
pub fn stages_to_json(stages: &[Stage]) -> Value {
    Value::Array(stages.iter().map(Stage::to_document).collect())
}
