//! Validation of configuration documents against the live environment.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::catalog::{Catalog, collect_dependencies};
use crate::core::document::ConfigurationDocument;
use crate::core::structure::structural_problems;
use crate::core::types::{EnvironmentDependency, Issue, ValidationVerdict};
use crate::io::document_store::load_document;
use crate::io::env_store::Environment;

/// Checks documents against the catalog and an environment snapshot.
///
/// Never mutates the document or the environment.
#[derive(Debug, Clone)]
pub struct ConfigurationValidator<'a> {
    catalog: &'a Catalog,
    root: PathBuf,
}

impl<'a> ConfigurationValidator<'a> {
    /// `root` anchors relative `expected_outputs` paths.
    pub fn new(catalog: &'a Catalog, root: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            root: root.into(),
        }
    }

    /// Dependencies implied by the providers named in `runtime`, plus a
    /// warning for every provider the catalog does not know.
    pub fn implied_dependencies(
        &self,
        document: &ConfigurationDocument,
    ) -> (Vec<EnvironmentDependency>, Vec<Issue>) {
        let mut unknown = Vec::new();
        let providers: Vec<_> = document
            .runtime
            .keys()
            .filter_map(|name| {
                let provider = self.catalog.get(name);
                if provider.is_none() {
                    unknown.push(Issue::unknown_provider(name));
                }
                provider
            })
            .collect();
        (collect_dependencies(providers), unknown)
    }

    /// Verdict for running `document` in `env` now.
    ///
    /// Missing required dependencies and structural problems are errors;
    /// missing optional dependencies, unknown providers and recorded build
    /// warnings are warnings.
    #[instrument(skip_all, fields(name = %document.name()))]
    pub fn validate_pre_execution(
        &self,
        document: &ConfigurationDocument,
        env: &Environment,
    ) -> ValidationVerdict {
        let mut errors: Vec<Issue> = structural_problems(document)
            .into_iter()
            .map(Issue::structural)
            .collect();
        let (dependencies, mut warnings) = self.implied_dependencies(document);

        for dep in &dependencies {
            if env.value(&dep.name).is_some() {
                continue;
            }
            if dep.required {
                errors.push(Issue::missing_dependency(&dep.name));
            } else {
                warnings.push(Issue::missing_optional_dependency(&dep.name));
            }
        }
        warnings.extend(
            document
                .metadata
                .warnings
                .iter()
                .map(|warning| Issue::recorded_warning(warning)),
        );

        let verdict = ValidationVerdict::from_issues(errors, warnings);
        if verdict.passed {
            info!(warnings = verdict.warnings.len(), "pre-execution validation passed");
        } else {
            warn!(errors = verdict.errors.len(), "pre-execution validation failed");
        }
        verdict
    }

    /// True when every expected output exists. No validation section means
    /// nothing to check.
    #[instrument(skip_all, fields(name = %document.name()))]
    pub fn validate_post_execution(
        &self,
        document: &ConfigurationDocument,
        env: &Environment,
    ) -> bool {
        let Some(section) = &document.validation else {
            return true;
        };
        let mut passed = true;
        for output in &section.expected_outputs {
            let expanded = env.expand(output);
            let path = self.resolve_path(&expanded);
            if path.exists() {
                debug!(path = %path.display(), "expected output present");
            } else {
                warn!(output = %output, path = %path.display(), "expected output missing");
                passed = false;
            }
        }
        passed
    }

    /// Load `path` and validate it; load failures propagate.
    pub fn validate_file(
        &self,
        path: &Path,
        env: &Environment,
    ) -> Result<(ConfigurationDocument, ValidationVerdict)> {
        let document = load_document(path)?;
        let verdict = self.validate_pre_execution(&document, env);
        Ok((document, verdict))
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
