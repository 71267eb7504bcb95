//! Structural checks for configuration documents.
//!
//! Two layers: JSON Schema conformance of the raw value (section presence,
//! type shape) and semantic invariants not expressible in the schema.

use jsonschema::validator_for;
use serde_json::Value;

use crate::core::document::ConfigurationDocument;
use crate::core::text::validate_name;

const CONFIGURATION_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/configuration/v1.schema.json"
));

/// Schema violations of a raw document value (empty on success).
pub fn schema_violations(instance: &Value) -> Vec<String> {
    let schema: Value = match serde_json::from_str(CONFIGURATION_SCHEMA) {
        Ok(schema) => schema,
        Err(err) => return vec![format!("embedded schema is not valid json: {err}")],
    };
    let compiled = match validator_for(&schema) {
        Ok(compiled) => compiled,
        Err(err) => return vec![format!("embedded schema is invalid: {err}")],
    };
    compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect()
}

/// Semantic invariants of a typed document:
/// - `metadata.name` is a valid filename stem
/// - `task.natural_language` is non-empty
/// - runtime provider and parameter names are non-empty
/// - runtime parameter values are scalars
/// - expected outputs are non-empty
pub fn document_invariants(document: &ConfigurationDocument) -> Vec<String> {
    let mut errors = Vec::new();

    if let Err(reason) = validate_name(&document.metadata.name) {
        errors.push(format!("metadata.name: {reason}"));
    }
    if document.task.natural_language.trim().is_empty() {
        errors.push("task.natural_language must be non-empty".to_string());
    }

    for (provider, params) in &document.runtime {
        if provider.trim().is_empty() {
            errors.push("runtime: provider names must be non-empty".to_string());
        }
        for (key, value) in params {
            if key.trim().is_empty() {
                errors.push(format!("runtime.{provider}: parameter names must be non-empty"));
            }
            if value.is_array() || value.is_object() {
                errors.push(format!("runtime.{provider}.{key}: value must be a scalar"));
            }
        }
    }

    if let Some(section) = &document.validation {
        for (index, output) in section.expected_outputs.iter().enumerate() {
            if output.trim().is_empty() {
                errors.push(format!("validation.expected_outputs[{index}] must be non-empty"));
            }
        }
    }

    errors
}

/// All structural problems of a typed document: schema and invariants.
pub fn structural_problems(document: &ConfigurationDocument) -> Vec<String> {
    let mut problems = match serde_json::to_value(document) {
        Ok(value) => schema_violations(&value),
        Err(err) => vec![format!("document is not serializable: {err}")],
    };
    problems.extend(document_invariants(document));
    problems
}
