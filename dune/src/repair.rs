//! Bounded auto-repair of validation errors.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use crate::core::document::ConfigurationDocument;
use crate::core::types::{EnvironmentDependency, Issue, ValidationVerdict};
use crate::io::env_store::Environment;
use crate::io::prompt::Prompter;
use crate::resolver::EnvironmentResolver;

/// Result of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Dependencies that now have a value, in error order.
    pub fixed: Vec<String>,
    /// Repairable dependencies that stayed without a value.
    pub unresolved: Vec<String>,
    /// Errors repair does not touch (structural problems).
    pub unrepairable: Vec<Issue>,
    /// Notes from interactive prompting, such as exhausted attempts.
    pub notes: Vec<Issue>,
}

impl RepairOutcome {
    pub fn any_fixed(&self) -> bool {
        !self.fixed.is_empty()
    }
}

/// Re-resolves missing dependencies reported by a verdict.
pub struct RepairCoordinator<'r> {
    resolver: &'r mut EnvironmentResolver,
}

impl<'r> RepairCoordinator<'r> {
    pub fn new(resolver: &'r mut EnvironmentResolver) -> Self {
        Self { resolver }
    }

    /// Single pass over `verdict.errors`.
    ///
    /// Each missing dependency is auto-detected, or asked for when a prompter
    /// is given; obtained values go to the live environment and its store.
    /// Never fails: a store write error is logged and the value stays live.
    /// The caller re-validates.
    #[instrument(skip_all, fields(name = %document.name(), errors = verdict.errors.len()))]
    pub fn repair(
        &mut self,
        verdict: &ValidationVerdict,
        document: &ConfigurationDocument,
        env: &mut Environment,
        mut prompter: Option<&mut dyn Prompter>,
    ) -> RepairOutcome {
        let mut outcome = RepairOutcome::default();

        for issue in &verdict.errors {
            let name = match issue.dependency.as_deref() {
                Some(name) if issue.is_repairable() => name,
                _ => {
                    outcome.unrepairable.push(issue.clone());
                    continue;
                }
            };
            if outcome.fixed.iter().chain(&outcome.unresolved).any(|seen| seen == name) {
                continue;
            }

            self.resolver.rerequest(name);
            let detected = self.resolver.auto_detect([name], env);
            if let Some(value) = detected.get(name) {
                info!(name, "repaired by auto-detection");
                self.persist(env, name, value);
                outcome.fixed.push(name.to_string());
                continue;
            }

            let Some(prompter) = prompter.as_deref_mut() else {
                outcome.unresolved.push(name.to_string());
                continue;
            };
            let dependency = [EnvironmentDependency::new(name, true)];
            match self.resolver.interactive_resolve(&dependency, prompter) {
                Ok(resolution) => {
                    outcome.notes.extend(resolution.issues);
                    match resolution.values.get(name) {
                        Some(value) if !value.trim().is_empty() => {
                            info!(name, "repaired interactively");
                            self.persist(env, name, value);
                            outcome.fixed.push(name.to_string());
                        }
                        _ => outcome.unresolved.push(name.to_string()),
                    }
                }
                Err(err) => {
                    warn!(name, err = %format!("{err:#}"), "interactive repair failed");
                    outcome.unresolved.push(name.to_string());
                }
            }
        }

        info!(
            fixed = outcome.fixed.len(),
            unresolved = outcome.unresolved.len(),
            unrepairable = outcome.unrepairable.len(),
            "repair pass finished"
        );
        outcome
    }

    fn persist(&self, env: &mut Environment, name: &str, value: &str) {
        let values = BTreeMap::from([(name.to_string(), value.to_string())]);
        if let Err(err) = self.resolver.persist(&values, env) {
            warn!(name, err = %format!("{err:#}"), "could not persist repaired value");
        }
    }
}
