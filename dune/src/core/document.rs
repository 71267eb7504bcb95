//! Configuration document: the unit of persistence and of validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::ValidationVerdict;

/// Parameter mapping of one provider (`param -> scalar`).
pub type Parameters = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDocument {
    pub metadata: Metadata,
    pub task: TaskSection,
    /// Provider name -> parameters.
    pub runtime: BTreeMap<String, Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique per saved document; also its filename stem.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Build-time notes (incomplete parameter sets, rejected values).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Provenance of interactive collection. Written, never read back.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub interactive_mapping: Option<InteractiveMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveMapping {
    pub libraries: Vec<String>,
    pub collected_parameters: BTreeMap<String, Parameters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSection {
    pub natural_language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Paths that must exist after execution (`${VAR}` expanded at check time).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verdict: Option<ValidationVerdict>,
}

impl ConfigurationDocument {
    /// Empty document for `name` and `text`.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            metadata: Metadata {
                name: name.into(),
                created_at: None,
                environment: None,
                generator: None,
                warnings: Vec::new(),
                interactive_mapping: None,
            },
            task: TaskSection {
                natural_language: text.into(),
            },
            runtime: BTreeMap::new(),
            validation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Merge `params` into `runtime[provider]`, overwriting only the keys given.
    pub fn merge_runtime(&mut self, provider: &str, params: Parameters) {
        self.runtime
            .entry(provider.to_string())
            .or_default()
            .extend(params);
    }

    /// Add expected outputs, skipping ones already present.
    pub fn expect_outputs<'a, I>(&mut self, outputs: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut outputs = outputs.into_iter().peekable();
        if outputs.peek().is_none() {
            return;
        }
        let section = self.validation.get_or_insert_with(ValidationSection::default);
        for output in outputs {
            if !section.expected_outputs.contains(output) {
                section.expected_outputs.push(output.clone());
            }
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.metadata.warnings.contains(&warning) {
            self.metadata.warnings.push(warning);
        }
    }
}
