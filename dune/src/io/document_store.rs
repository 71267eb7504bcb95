//! YAML persistence of configuration documents.
//!
//! Load runs the same structural checks as save: raw YAML is converted to a
//! JSON value, checked against the embedded schema, then deserialized and
//! checked for semantic invariants. Every failure on the way is reported as
//! [`DuneError::MalformedConfiguration`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use super::config::write_atomic;
use crate::core::document::ConfigurationDocument;
use crate::core::structure::{document_invariants, schema_violations, structural_problems};
use crate::core::text::validate_name;
use crate::error::DuneError;

/// Save `document` to `path` atomically.
///
/// The file stem of `path` must equal `metadata.name`.
#[instrument(skip_all, fields(path = %path.display(), name = %document.name()))]
pub fn save_document(document: &ConfigurationDocument, path: &Path) -> Result<()> {
    let name = document.name();
    validate_name(name).map_err(|reason| DuneError::InvalidDocumentName {
        name: name.to_string(),
        reason,
    })?;
    let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("");
    if stem != name {
        return Err(DuneError::InvalidDocumentName {
            name: name.to_string(),
            reason: format!("does not match file stem '{stem}' of {}", path.display()),
        }
        .into());
    }

    let problems = structural_problems(document);
    if !problems.is_empty() {
        return Err(malformed(&path.display().to_string(), problems));
    }

    let mut buf = serde_yaml::to_string(document).context("serialize configuration yaml")?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    write_atomic(path, &buf)?;
    debug!("configuration saved");
    Ok(())
}

/// Load and check a document from `path`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_document(path: &Path) -> Result<ConfigurationDocument> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let document = parse_document(&contents, &path.display().to_string())?;
    debug!(name = %document.name(), "configuration loaded");
    Ok(document)
}

/// Parse and check a document from YAML text.
pub fn parse_document(contents: &str, origin: &str) -> Result<ConfigurationDocument> {
    let value: Value = serde_yaml::from_str(contents)
        .map_err(|err| malformed(origin, vec![format!("not valid YAML: {err}")]))?;

    let violations = schema_violations(&value);
    if !violations.is_empty() {
        return Err(malformed(origin, violations));
    }

    let document: ConfigurationDocument = serde_json::from_value(value)
        .map_err(|err| malformed(origin, vec![err.to_string()]))?;

    let errors = document_invariants(&document);
    if !errors.is_empty() {
        return Err(malformed(origin, errors));
    }
    Ok(document)
}

fn malformed(origin: &str, problems: Vec<String>) -> anyhow::Error {
    DuneError::MalformedConfiguration {
        origin: origin.to_string(),
        problems,
    }
    .into()
}
