//! Capability mapping: task text -> ranked providers -> parameter values.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::catalog::{Catalog, CapabilityProvider, ParameterSpec};
use crate::core::document::Parameters;
use crate::core::text::tokenize;
use crate::core::types::Issue;
use crate::error::DuneError;
use crate::io::sources::ParameterSource;

/// Minimum keyword score for a provider to count as a match.
pub const DEFAULT_MATCH_THRESHOLD: u32 = 3;

/// A provider that matched a task, with its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderMatch<'a> {
    pub provider: &'a CapabilityProvider,
    pub score: u32,
}

/// One parameter after collection. `value` is `None` when left unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedParameter {
    pub spec: ParameterSpec,
    pub required: bool,
    pub value: Option<String>,
}

/// Parameter values collected for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterCollection {
    pub provider: String,
    /// Declaration order, required first. Secret parameters are absent.
    pub values: Vec<CollectedParameter>,
    /// Unset required parameters and rejected values.
    pub warnings: Vec<String>,
}

impl ParameterCollection {
    /// True when every required (non-secret) parameter has a value.
    pub fn is_complete(&self) -> bool {
        self.values
            .iter()
            .all(|param| !param.required || param.value.is_some())
    }

    /// Set values as a runtime parameter mapping.
    pub fn parameters(&self) -> Parameters {
        self.values
            .iter()
            .filter_map(|param| {
                param
                    .value
                    .as_ref()
                    .map(|value| (param.spec.name.clone(), Value::String(value.clone())))
            })
            .collect()
    }
}

/// Matches task descriptions against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityMapper<'a> {
    catalog: &'a Catalog,
    threshold: u32,
}

impl<'a> CapabilityMapper<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Providers scoring at or above the threshold, best first.
    ///
    /// Ties keep catalog order. Empty when nothing qualifies.
    #[instrument(skip_all, fields(threshold = self.threshold))]
    pub fn match_task(&self, text: &str) -> Vec<ProviderMatch<'a>> {
        let tokens = tokenize(text);
        let mut matches: Vec<ProviderMatch<'a>> = self
            .catalog
            .providers()
            .iter()
            .map(|provider| ProviderMatch {
                provider,
                score: provider.score_tokens(&tokens),
            })
            .filter(|candidate| candidate.score >= self.threshold)
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        debug!(
            matched = ?matches.iter().map(|m| (m.provider.name.as_str(), m.score)).collect::<Vec<_>>(),
            "task mapped"
        );
        matches
    }

    /// Like [`Self::match_task`], but an empty result is
    /// [`DuneError::NoMatchingCapability`].
    pub fn require_match(&self, text: &str) -> Result<Vec<ProviderMatch<'a>>> {
        let matches = self.match_task(text);
        if matches.is_empty() {
            return Err(DuneError::NoMatchingCapability {
                threshold: self.threshold,
            }
            .into());
        }
        Ok(matches)
    }

    /// Collect values for every non-secret parameter of `provider`.
    ///
    /// Required values are never invented: an unset one is recorded as a
    /// warning and leaves the collection incomplete. Values failing the
    /// parameter's check are rejected and treated as unset.
    #[instrument(skip_all, fields(provider = %provider.name))]
    pub fn collect_parameters(
        &self,
        provider: &CapabilityProvider,
        source: &mut dyn ParameterSource,
    ) -> Result<ParameterCollection> {
        let mut values = Vec::new();
        let mut warnings = Vec::new();

        for (spec, required) in provider.parameters() {
            if spec.secret {
                continue;
            }
            let mut value = source
                .supply(&provider.name, spec)?
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());

            if let (Some(candidate), Some(check)) = (&value, &spec.check)
                && let Err(reason) = check.check(candidate)
            {
                let kind = if required { "required" } else { "optional" };
                warnings.push(format!(
                    "{}: {kind} parameter '{}' rejected: {reason}",
                    provider.name, spec.name
                ));
                value = None;
            }
            if required && value.is_none() {
                warnings.push(Issue::incomplete(&provider.name, &spec.name, "is not set").message);
            }

            values.push(CollectedParameter {
                spec: spec.clone(),
                required,
                value,
            });
        }

        let collection = ParameterCollection {
            provider: provider.name.clone(),
            values,
            warnings,
        };
        if collection.is_complete() {
            info!(params = collection.values.len(), "parameters collected");
        } else {
            warn!(warnings = collection.warnings.len(), "parameter set incomplete");
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sources::{ExternalValues, StaticDefaults};
    use crate::test_support::{provider, test_catalog};

    #[test]
    fn polish_mail_task_maps_to_imap_fetcher_first() {
        let catalog = test_catalog();
        let mapper = CapabilityMapper::new(&catalog);
        let matches =
            mapper.match_task("Pobierz wszystkie wiadomości email ze skrzynki i zapisz je w CSV");
        let names: Vec<&str> = matches.iter().map(|m| m.provider.name.as_str()).collect();
        assert_eq!(names, vec!["imap_fetcher", "csv_processor"]);

        let required: Vec<&str> = matches[0]
            .provider
            .required_params
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(required, vec!["mailbox", "password"]);
    }

    #[test]
    fn unrelated_text_matches_nothing() {
        let catalog = test_catalog();
        let mapper = CapabilityMapper::new(&catalog);
        assert!(mapper.match_task("zrób mi kawę").is_empty());
        let err = mapper.require_match("zrób mi kawę").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DuneError>(),
            Some(DuneError::NoMatchingCapability { threshold: 3 })
        ));
    }

    #[test]
    fn ties_keep_catalog_order_and_threshold_applies() {
        let catalog = test_catalog();
        let mapper = CapabilityMapper::new(&catalog).with_threshold(1);
        // "email" scores 2 for imap_fetcher; "raport" scores 2 for csv_processor.
        let matches = mapper.match_task("raport email");
        let names: Vec<&str> = matches.iter().map(|m| m.provider.name.as_str()).collect();
        assert_eq!(names, vec!["imap_fetcher", "csv_processor"]);
        assert!(CapabilityMapper::new(&catalog).match_task("raport email").is_empty());
    }

    #[test]
    fn oversized_weights_still_rank() {
        let catalog = Catalog::new(vec![
            provider("greedy", &[("alpha", u32::MAX), ("beta", 1)], Vec::new(), Vec::new()),
            provider("modest", &[("alpha", 3)], Vec::new(), Vec::new()),
        ])
        .expect("catalog");
        let matches = CapabilityMapper::new(&catalog).match_task("alpha beta");
        let scores: Vec<(&str, u32)> = matches
            .iter()
            .map(|m| (m.provider.name.as_str(), m.score))
            .collect();
        assert_eq!(scores, vec![("greedy", u32::MAX), ("modest", 3)]);
    }

    #[test]
    fn collection_never_invents_required_values() {
        let catalog = test_catalog();
        let mapper = CapabilityMapper::new(&catalog);
        let imap = catalog.get("imap_fetcher").expect("imap_fetcher");

        let collection = mapper
            .collect_parameters(imap, &mut StaticDefaults)
            .expect("collect");

        assert!(!collection.is_complete());
        assert_eq!(
            collection.warnings,
            vec!["imap_fetcher: required parameter 'mailbox' is not set"]
        );
        // password is secret and never collected.
        assert!(collection.values.iter().all(|p| p.spec.name != "password"));
        assert_eq!(
            collection.parameters().get("imap_server"),
            Some(&Value::String("imap.example.com".to_string()))
        );
    }

    #[test]
    fn collection_rejects_values_failing_checks() {
        let catalog = test_catalog();
        let mapper = CapabilityMapper::new(&catalog);
        let csv = catalog.get("csv_processor").expect("csv_processor");
        let mut source = ExternalValues::new([("input_file", "data.csv"), ("delimiter", "#")]);

        let collection = mapper.collect_parameters(csv, &mut source).expect("collect");

        assert!(collection.is_complete());
        assert_eq!(collection.warnings.len(), 1);
        assert!(collection.warnings[0].contains("optional parameter 'delimiter' rejected"));
        assert!(!collection.parameters().contains_key("delimiter"));
    }
}
