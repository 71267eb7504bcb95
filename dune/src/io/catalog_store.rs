//! Loading of the provider catalog (embedded default or a TOML file).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::catalog::Catalog;
use crate::error::DuneError;

const BUILTIN_CATALOG: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/catalog/default.toml"));

/// The catalog shipped with the binary.
pub fn builtin_catalog() -> Result<Catalog> {
    parse_catalog(BUILTIN_CATALOG, "<builtin>")
}

/// Load the catalog at `path`, or the built-in one when `path` is `None`.
#[instrument(skip_all, fields(path = ?path))]
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let catalog = match path {
        Some(path) => {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            parse_catalog(&contents, &path.display().to_string())?
        }
        None => builtin_catalog()?,
    };
    debug!(providers = catalog.providers().len(), "catalog loaded");
    Ok(catalog)
}

/// Parse and validate catalog TOML.
pub fn parse_catalog(contents: &str, origin: &str) -> Result<Catalog> {
    let catalog: Catalog = toml::from_str(contents).with_context(|| format!("parse {origin}"))?;
    let mut problems = catalog.problems();
    if catalog.is_empty() {
        problems.push("catalog declares no providers".to_string());
    }
    if !problems.is_empty() {
        return Err(DuneError::InvalidCatalog {
            origin: origin.to_string(),
            problems,
        }
        .into());
    }
    Ok(catalog)
}
