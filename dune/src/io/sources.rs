//! Pluggable supply of provider parameter values.

use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use super::env_store::Environment;
use super::prompt::Prompter;
use crate::core::catalog::ParameterSpec;
use crate::resolver::AutoDetector;

/// Where parameter values come from during collection.
pub trait ParameterSource {
    /// Value for `spec` of `provider`, or `None` to leave it unset.
    fn supply(&mut self, provider: &str, spec: &ParameterSpec) -> Result<Option<String>>;
}

/// Declared defaults only.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticDefaults;

impl ParameterSource for StaticDefaults {
    fn supply(&mut self, _provider: &str, spec: &ParameterSpec) -> Result<Option<String>> {
        Ok(spec.default.clone())
    }
}

/// Values supplied up front, keyed by `provider.param` or bare `param`.
#[derive(Debug, Default, Clone)]
pub struct ExternalValues {
    values: BTreeMap<String, String>,
}

impl ExternalValues {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ParameterSource for ExternalValues {
    fn supply(&mut self, provider: &str, spec: &ParameterSpec) -> Result<Option<String>> {
        let qualified = format!("{provider}.{}", spec.name);
        Ok(self
            .values
            .get(&qualified)
            .or_else(|| self.values.get(&spec.name))
            .cloned())
    }
}

/// Values the environment already provides for the parameter's dependency.
pub struct AutoDetectSource<'a> {
    detector: &'a AutoDetector,
    env: &'a Environment,
}

impl<'a> AutoDetectSource<'a> {
    pub fn new(detector: &'a AutoDetector, env: &'a Environment) -> Self {
        Self { detector, env }
    }
}

impl ParameterSource for AutoDetectSource<'_> {
    fn supply(&mut self, _provider: &str, spec: &ParameterSpec) -> Result<Option<String>> {
        Ok(self.detector.detect(&spec.dependency_name(), self.env))
    }
}

/// Ask the operator, offering the declared default.
pub struct InteractiveSource<'a> {
    prompter: &'a mut dyn Prompter,
}

impl<'a> InteractiveSource<'a> {
    pub fn new(prompter: &'a mut dyn Prompter) -> Self {
        Self { prompter }
    }
}

impl ParameterSource for InteractiveSource<'_> {
    fn supply(&mut self, provider: &str, spec: &ParameterSpec) -> Result<Option<String>> {
        let question = match &spec.default {
            Some(default) => format!("[{provider}] {} [{default}]: ", spec.prompt),
            None => format!("[{provider}] {}: ", spec.prompt),
        };
        let answer = self.prompter.ask(&question)?;
        let value = match answer.as_deref().map(str::trim) {
            Some(answer) if !answer.is_empty() => Some(answer.to_string()),
            _ => spec.default.clone(),
        };
        debug!(provider, param = %spec.name, supplied = value.is_some(), "interactive parameter");
        Ok(value)
    }
}

/// Try `first`, then `second` when `first` leaves the value unset.
pub struct Fallback<A, B> {
    first: A,
    second: B,
}

impl<A, B> Fallback<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: ParameterSource, B: ParameterSource> ParameterSource for Fallback<A, B> {
    fn supply(&mut self, provider: &str, spec: &ParameterSpec) -> Result<Option<String>> {
        match self.first.supply(provider, spec)? {
            Some(value) => Ok(Some(value)),
            None => self.second.supply(provider, spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedPrompter, param};

    #[test]
    fn external_values_prefer_qualified_keys() {
        let mut source = ExternalValues::new([
            ("mailbox", "INBOX"),
            ("imap_fetcher.mailbox", "Archive"),
        ]);
        let spec = param("mailbox", None);
        assert_eq!(
            source.supply("imap_fetcher", &spec).expect("supply"),
            Some("Archive".to_string())
        );
        assert_eq!(
            source.supply("email_organizer", &spec).expect("supply"),
            Some("INBOX".to_string())
        );
    }

    #[test]
    fn interactive_empty_answer_takes_default() {
        let mut prompter = ScriptedPrompter::new(["", "  Sent  "]);
        let spec = param("mailbox", Some("INBOX"));
        let mut source = InteractiveSource::new(&mut prompter);
        assert_eq!(
            source.supply("imap_fetcher", &spec).expect("supply"),
            Some("INBOX".to_string())
        );
        assert_eq!(
            source.supply("imap_fetcher", &spec).expect("supply"),
            Some("Sent".to_string())
        );
        assert_eq!(prompter.asked()[0], "[imap_fetcher] mailbox? [INBOX]: ");
    }

    #[test]
    fn fallback_consults_second_source_only_when_unset() {
        let detector = AutoDetector::new(".", BTreeMap::new());
        let env = Environment::from_vars([("DUNE_MAILBOX", "Work")]);
        let mut source = Fallback::new(AutoDetectSource::new(&detector, &env), StaticDefaults);

        let mailbox = param("mailbox", Some("INBOX"));
        let folder = param("folder_format", Some("eml"));
        assert_eq!(
            source.supply("imap_fetcher", &mailbox).expect("supply"),
            Some("Work".to_string())
        );
        assert_eq!(
            source.supply("imap_fetcher", &folder).expect("supply"),
            Some("eml".to_string())
        );
    }
}
