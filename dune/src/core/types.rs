//! Shared deterministic types for the configuration pipeline.
//!
//! These types define stable contracts between components (mapper, resolver,
//! validator, repair). They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix applied to every environment dependency name.
pub const DEPENDENCY_PREFIX: &str = "DUNE_";

/// Leading text of every missing-required-dependency error message.
pub const MISSING_VARIABLE_SENTINEL: &str = "missing environment variable: ";

/// Runtime environment the pipeline is configured for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    #[default]
    Development,
    Testing,
    Production,
}

impl RunEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            RunEnvironment::Development => "development",
            RunEnvironment::Testing => "testing",
            RunEnvironment::Production => "production",
        }
    }
}

impl fmt::Display for RunEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a provider parameter name to its environment dependency name.
///
/// `mailbox` -> `DUNE_MAILBOX`, `imap-server` -> `DUNE_IMAP_SERVER`.
pub fn dependency_name(param: &str) -> String {
    let mut name = String::with_capacity(DEPENDENCY_PREFIX.len() + param.len());
    name.push_str(DEPENDENCY_PREFIX);
    name.extend(param.trim().chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}

/// A logically-named value a provider needs from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDependency {
    pub name: String,
    pub required: bool,
    /// Absent until resolved.
    pub value: Option<String>,
}

impl EnvironmentDependency {
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            value: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

/// Deduplicate dependencies by name, keeping first-appearance order.
///
/// A name required by any contributor is required.
pub fn dedup_dependencies<I>(deps: I) -> Vec<EnvironmentDependency>
where
    I: IntoIterator<Item = EnvironmentDependency>,
{
    let mut out: Vec<EnvironmentDependency> = Vec::new();
    for dep in deps {
        match out.iter_mut().find(|existing| existing.name == dep.name) {
            Some(existing) => existing.required |= dep.required,
            None => out.push(dep),
        }
    }
    out
}

/// Classification of a verdict or report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A dependency is absent or empty in the current environment.
    MissingEnvironmentDependency,
    /// A required provider parameter stayed unset during collection.
    IncompleteParameters,
    /// Interactive resolution ran out of attempts for a required dependency.
    ResolutionExhausted,
    /// Document shape is wrong. Never repairable.
    Structural,
    /// `runtime` names a provider the catalog does not know.
    UnknownProvider,
}

/// One itemized error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn missing_dependency(name: &str) -> Self {
        Self {
            kind: IssueKind::MissingEnvironmentDependency,
            dependency: Some(name.to_string()),
            message: format!("{MISSING_VARIABLE_SENTINEL}{name}"),
        }
    }

    pub fn missing_optional_dependency(name: &str) -> Self {
        Self {
            kind: IssueKind::MissingEnvironmentDependency,
            dependency: Some(name.to_string()),
            message: format!("optional environment variable not set: {name}"),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Structural,
            dependency: None,
            message: message.into(),
        }
    }

    pub fn incomplete(provider: &str, param: &str, detail: &str) -> Self {
        Self {
            kind: IssueKind::IncompleteParameters,
            dependency: Some(dependency_name(param)),
            message: format!("{provider}: required parameter '{param}' {detail}"),
        }
    }

    pub fn exhausted(name: &str, attempts: u32) -> Self {
        Self {
            kind: IssueKind::ResolutionExhausted,
            dependency: Some(name.to_string()),
            message: format!("{name} left unresolved after {attempts} attempt(s)"),
        }
    }

    pub fn unknown_provider(name: &str) -> Self {
        Self {
            kind: IssueKind::UnknownProvider,
            dependency: None,
            message: format!("unknown provider '{name}' in runtime; its dependencies are not checked"),
        }
    }

    /// Build-time note recorded in `metadata.warnings`, carried into verdicts.
    pub fn recorded_warning(message: &str) -> Self {
        Self {
            kind: IssueKind::IncompleteParameters,
            dependency: None,
            message: message.to_string(),
        }
    }

    pub fn is_repairable(&self) -> bool {
        self.kind == IssueKind::MissingEnvironmentDependency && self.dependency.is_some()
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Pass/fail result of checking a document against the live environment.
///
/// Produced fresh on every validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<Issue>,
}

impl ValidationVerdict {
    pub fn from_issues(errors: Vec<Issue>, warnings: Vec<Issue>) -> Self {
        Self {
            passed: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Names of required dependencies reported missing, in report order.
    pub fn missing_dependencies(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|issue| issue.is_repairable())
            .filter_map(|issue| issue.dependency.as_deref())
            .collect()
    }

    pub fn has_repairable_errors(&self) -> bool {
        self.errors.iter().any(Issue::is_repairable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_name_prefixes_and_uppercases() {
        assert_eq!(dependency_name("mailbox"), "DUNE_MAILBOX");
        assert_eq!(dependency_name("imap-server"), "DUNE_IMAP_SERVER");
        assert_eq!(dependency_name(" output dir "), "DUNE_OUTPUT_DIR");
    }

    #[test]
    fn dedup_upgrades_to_required() {
        let deps = dedup_dependencies(vec![
            EnvironmentDependency::new("DUNE_A", false),
            EnvironmentDependency::new("DUNE_B", true),
            EnvironmentDependency::new("DUNE_A", true),
        ]);
        let summary: Vec<(&str, bool)> = deps
            .iter()
            .map(|dep| (dep.name.as_str(), dep.required))
            .collect();
        assert_eq!(summary, vec![("DUNE_A", true), ("DUNE_B", true)]);
    }

    #[test]
    fn missing_dependency_message_keeps_sentinel() {
        let issue = Issue::missing_dependency("DUNE_PASSWORD");
        assert_eq!(
            issue.to_string(),
            "missing environment variable: DUNE_PASSWORD"
        );
        assert!(issue.is_repairable());
    }

    #[test]
    fn verdict_lists_only_repairable_dependencies() {
        let verdict = ValidationVerdict::from_issues(
            vec![
                Issue::structural("task.natural_language must be non-empty"),
                Issue::missing_dependency("DUNE_MAILBOX"),
            ],
            vec![Issue::missing_optional_dependency("DUNE_PORT")],
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.missing_dependencies(), vec!["DUNE_MAILBOX"]);
    }
}
