//! Assembly of configuration documents from task text and collected values.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, instrument};

use crate::core::catalog::CapabilityProvider;
use crate::core::document::{ConfigurationDocument, InteractiveMapping, Parameters};
use crate::core::text::{document_name, validate_name};
use crate::core::types::RunEnvironment;
use crate::error::DuneError;
use crate::io::document_store::{load_document, save_document};
use crate::mapper::ParameterCollection;

const GENERATOR: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Builds documents for one run environment.
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    environment: RunEnvironment,
}

impl ConfigurationBuilder {
    pub fn new(environment: RunEnvironment) -> Self {
        Self { environment }
    }

    /// New document for `text` with a deterministic name.
    ///
    /// Same text, same name; `runtime` starts empty.
    pub fn from_natural_language(&self, text: &str) -> ConfigurationDocument {
        let mut document = ConfigurationDocument::new(document_name(text), text.trim());
        document.metadata.created_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        document.metadata.environment = Some(self.environment.to_string());
        document.metadata.generator = Some(GENERATOR.to_string());
        debug!(name = %document.name(), "document created");
        document
    }

    /// Non-destructive merge of `params` into `runtime[provider]`.
    pub fn merge_runtime(
        &self,
        document: &mut ConfigurationDocument,
        provider: &str,
        params: Parameters,
    ) {
        document.merge_runtime(provider, params);
    }

    /// Merge collected parameters, record build warnings and the providers'
    /// declared outputs.
    #[instrument(skip_all, fields(name = %document.name(), providers = providers.len()))]
    pub fn apply_providers(
        &self,
        document: &mut ConfigurationDocument,
        providers: &[&CapabilityProvider],
        collections: &[ParameterCollection],
    ) {
        for collection in collections {
            self.merge_runtime(document, &collection.provider, collection.parameters());
            for warning in &collection.warnings {
                document.add_warning(warning.clone());
            }
        }
        for provider in providers {
            document.expect_outputs(&provider.outputs);
        }
    }

    /// Record which providers were offered and what was collected.
    pub fn record_mapping(
        &self,
        document: &mut ConfigurationDocument,
        providers: &[&CapabilityProvider],
        collections: &[ParameterCollection],
    ) {
        let collected_parameters: BTreeMap<String, Parameters> = collections
            .iter()
            .map(|collection| (collection.provider.clone(), collection.parameters()))
            .collect();
        document.metadata.interactive_mapping = Some(InteractiveMapping {
            libraries: providers.iter().map(|provider| provider.name.clone()).collect(),
            collected_parameters,
        });
    }

    /// Give `document` a caller-chosen name (e.g. the stem of a save path).
    pub fn rename(&self, document: &mut ConfigurationDocument, name: &str) -> Result<()> {
        validate_name(name).map_err(|reason| DuneError::InvalidDocumentName {
            name: name.to_string(),
            reason,
        })?;
        document.metadata.name = name.to_string();
        Ok(())
    }

    pub fn save(&self, document: &ConfigurationDocument, path: &Path) -> Result<()> {
        save_document(document, path)
    }

    pub fn load(&self, path: &Path) -> Result<ConfigurationDocument> {
        load_document(path)
    }
}
