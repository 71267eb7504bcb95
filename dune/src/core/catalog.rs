//! Capability provider catalog.
//!
//! Providers are plain data loaded once at startup. Each one exposes a
//! keyword table for scoring and an ordered parameter schema.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::text::{keyword_score, tokenize};
use crate::core::types::{EnvironmentDependency, dedup_dependencies, dependency_name};

/// Validation predicate attached to a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamCheck {
    NonEmpty,
    Integer,
    Port,
    Email,
    Url,
    OneOf(Vec<String>),
    Pattern(String),
}

impl ParamCheck {
    /// Check `value`, returning a short reason on rejection.
    pub fn check(&self, value: &str) -> Result<(), String> {
        let value = value.trim();
        match self {
            ParamCheck::NonEmpty => {
                if value.is_empty() {
                    return Err("must not be empty".to_string());
                }
            }
            ParamCheck::Integer => {
                value
                    .parse::<i64>()
                    .map_err(|_| format!("'{value}' is not an integer"))?;
            }
            ParamCheck::Port => match value.parse::<u16>() {
                Ok(port) if port > 0 => {}
                _ => return Err(format!("'{value}' is not a port number (1-65535)")),
            },
            ParamCheck::Email => {
                let valid = value.split_once('@').is_some_and(|(local, domain)| {
                    !local.is_empty()
                        && !domain.contains('@')
                        && domain.contains('.')
                        && !domain.starts_with('.')
                        && !domain.ends_with('.')
                });
                if !valid {
                    return Err(format!("'{value}' is not an e-mail address"));
                }
            }
            ParamCheck::Url => {
                let host = value
                    .strip_prefix("https://")
                    .or_else(|| value.strip_prefix("http://"));
                if !host.is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/')) {
                    return Err(format!("'{value}' is not an http(s) URL"));
                }
            }
            ParamCheck::OneOf(choices) => {
                if !choices.iter().any(|choice| choice == value) {
                    return Err(format!(
                        "'{value}' is not one of: {}",
                        choices.join(", ")
                    ));
                }
            }
            ParamCheck::Pattern(pattern) => {
                let re = Regex::new(pattern).map_err(|err| format!("bad pattern: {err}"))?;
                if !re.is_match(value) {
                    return Err(format!("'{value}' does not match {pattern}"));
                }
            }
        }
        Ok(())
    }
}

/// One parameter declared by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// Human prompt text.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<ParamCheck>,
    /// Environment-only value (credentials). Never collected into `runtime`.
    #[serde(default)]
    pub secret: bool,
}

impl ParameterSpec {
    pub fn dependency_name(&self) -> String {
        dependency_name(&self.name)
    }
}

/// A named unit of functionality matched against task descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProvider {
    pub name: String,
    /// Backing package/module reference.
    pub package: String,
    #[serde(default)]
    pub description: String,
    /// Keyword stem -> weight.
    #[serde(default)]
    pub keywords: BTreeMap<String, u32>,
    #[serde(default, rename = "required")]
    pub required_params: Vec<ParameterSpec>,
    #[serde(default, rename = "optional")]
    pub optional_params: Vec<ParameterSpec>,
    /// Output locations the provider writes to (`${VAR}` allowed).
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl CapabilityProvider {
    pub fn match_score(&self, text: &str) -> u32 {
        self.score_tokens(&tokenize(text))
    }

    pub fn score_tokens(&self, tokens: &[String]) -> u32 {
        keyword_score(&self.keywords, tokens)
    }

    /// All parameters in declaration order, required first, with their flag.
    pub fn parameters(&self) -> impl Iterator<Item = (&ParameterSpec, bool)> {
        self.required_params
            .iter()
            .map(|spec| (spec, true))
            .chain(self.optional_params.iter().map(|spec| (spec, false)))
    }

    pub fn dependencies(&self) -> Vec<EnvironmentDependency> {
        dedup_dependencies(
            self.parameters()
                .map(|(spec, required)| EnvironmentDependency::new(spec.dependency_name(), required)),
        )
    }
}

/// Dependencies of several providers, deduplicated by name.
pub fn collect_dependencies<'a, I>(providers: I) -> Vec<EnvironmentDependency>
where
    I: IntoIterator<Item = &'a CapabilityProvider>,
{
    dedup_dependencies(providers.into_iter().flat_map(CapabilityProvider::dependencies))
}

/// Read-only provider registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "provider")]
    providers: Vec<CapabilityProvider>,
}

impl Catalog {
    /// Build a catalog, returning every validation problem on failure.
    pub fn new(providers: Vec<CapabilityProvider>) -> Result<Self, Vec<String>> {
        let catalog = Self { providers };
        let problems = catalog.problems();
        if problems.is_empty() {
            Ok(catalog)
        } else {
            Err(problems)
        }
    }

    pub fn providers(&self) -> &[CapabilityProvider] {
        &self.providers
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityProvider> {
        self.providers.iter().find(|provider| provider.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Semantic checks not expressible in the catalog file format.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut names = BTreeSet::new();
        for provider in &self.providers {
            let label = if provider.name.is_empty() {
                "<unnamed>"
            } else {
                provider.name.as_str()
            };
            if !is_identifier(&provider.name) {
                problems.push(format!("{label}: name must be [a-z0-9_] and non-empty"));
            }
            if !names.insert(provider.name.as_str()) {
                problems.push(format!("duplicate provider '{label}'"));
            }
            if provider.package.trim().is_empty() {
                problems.push(format!("{label}: package must be non-empty"));
            }
            if provider.keywords.is_empty() {
                problems.push(format!("{label}: at least one keyword is required"));
            }
            for (keyword, weight) in &provider.keywords {
                if keyword.trim().is_empty() {
                    problems.push(format!("{label}: keywords must be non-empty"));
                }
                if *weight == 0 {
                    problems.push(format!("{label}: keyword '{keyword}' weight must be > 0"));
                }
            }
            let mut params = BTreeSet::new();
            for (spec, _) in provider.parameters() {
                if !is_identifier(&spec.name) {
                    problems.push(format!(
                        "{label}: parameter '{}' must be [a-z0-9_] and non-empty",
                        spec.name
                    ));
                }
                if !params.insert(spec.name.as_str()) {
                    problems.push(format!("{label}: duplicate parameter '{}'", spec.name));
                }
                if spec.prompt.trim().is_empty() {
                    problems.push(format!("{label}.{}: prompt must be non-empty", spec.name));
                }
                if let Some(ParamCheck::Pattern(pattern)) = &spec.check
                    && let Err(err) = Regex::new(pattern)
                {
                    problems.push(format!("{label}.{}: invalid pattern: {err}", spec.name));
                }
                if let (Some(check), Some(default)) = (&spec.check, &spec.default)
                    && let Err(reason) = check.check(default)
                {
                    problems.push(format!("{label}.{}: default {reason}", spec.name));
                }
            }
        }
        problems
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
