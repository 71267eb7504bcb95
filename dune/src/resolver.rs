//! Environment dependency resolution.
//!
//! Auto-detection first, interactive prompting second. Each dependency is
//! handled at most once per session unless it is explicitly re-requested.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{DEPENDENCY_PREFIX, EnvironmentDependency, Issue};
use crate::io::env_store::Environment;
use crate::io::prompt::Prompter;

/// Alternate variable names tried after the unprefixed name.
const BUILTIN_ALIASES: &[(&str, &[&str])] = &[
    ("DUNE_PASSWORD", &["IMAP_PASSWORD", "EMAIL_PASSWORD", "MAIL_PASSWORD"]),
    ("DUNE_USERNAME", &["IMAP_USERNAME", "IMAP_USER", "EMAIL_USER", "EMAIL_ADDRESS"]),
    ("DUNE_IMAP_SERVER", &["IMAP_SERVER", "IMAP_HOST", "EMAIL_SERVER"]),
    ("DUNE_IMAP_PORT", &["IMAP_PORT"]),
    ("DUNE_MAILBOX", &["IMAP_MAILBOX", "IMAP_FOLDER"]),
    ("DUNE_DATABASE_URL", &["DATABASE_URL"]),
    ("DUNE_API_TOKEN", &["API_TOKEN", "API_KEY"]),
];

/// Values used when nothing else provides one.
const STATIC_DEFAULTS: &[(&str, &str)] = &[
    ("DUNE_OUTPUT_DIR", "./output"),
    ("DUNE_LOG_LEVEL", "INFO"),
];

/// Side-effect-free dependency detection.
#[derive(Debug, Clone, Default)]
pub struct AutoDetector {
    root: PathBuf,
    aliases: BTreeMap<String, Vec<String>>,
}

impl AutoDetector {
    /// `root` anchors well-known directory lookups; `aliases` are tried before
    /// the built-in ones.
    pub fn new(root: impl Into<PathBuf>, aliases: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            root: root.into(),
            aliases,
        }
    }

    /// Detect a value for `name`:
    /// 1. the variable itself
    /// 2. the unprefixed name, then configured and built-in aliases
    /// 3. for `*_DIR` names, an existing `./<suffix>` directory under the root
    /// 4. built-in static defaults
    pub fn detect(&self, name: &str, env: &Environment) -> Option<String> {
        if let Some(value) = env.value(name) {
            return Some(value.to_string());
        }
        for alternate in self.alternates(name) {
            if let Some(value) = env.value(&alternate) {
                debug!(name, alternate = %alternate, "detected via alternate name");
                return Some(value.to_string());
            }
        }
        if let Some(dir) = self.well_known_dir(name) {
            debug!(name, dir = %dir, "detected existing directory");
            return Some(dir);
        }
        STATIC_DEFAULTS
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// Detected values for `names`; undetectable ones are absent.
    pub fn detect_all<I, S>(&self, names: I, env: &Environment) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.detect(name, env).map(|value| (name.to_string(), value))
            })
            .collect()
    }

    fn alternates(&self, name: &str) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(bare) = name.strip_prefix(DEPENDENCY_PREFIX)
            && !bare.is_empty()
        {
            names.push(bare.to_string());
        }
        if let Some(configured) = self.aliases.get(name) {
            names.extend(configured.iter().cloned());
        }
        if let Some((_, builtin)) = BUILTIN_ALIASES.iter().find(|(key, _)| *key == name) {
            names.extend(builtin.iter().map(|alias| alias.to_string()));
        }
        names
    }

    fn well_known_dir(&self, name: &str) -> Option<String> {
        let bare = name.strip_prefix(DEPENDENCY_PREFIX).unwrap_or(name);
        let stem = bare.strip_suffix("_DIR")?;
        if stem.is_empty() {
            return None;
        }
        let relative = stem.to_lowercase();
        self.root
            .join(&relative)
            .is_dir()
            .then(|| format!("./{relative}"))
    }
}

/// Outcome of resolving a set of dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Newly obtained values (not already present in the environment).
    pub values: BTreeMap<String, String>,
    /// Required names left without a value.
    pub unresolved: Vec<String>,
    /// Itemized notes (e.g. exhausted prompts).
    pub issues: Vec<Issue>,
}

impl Resolution {
    fn absorb(&mut self, other: Resolution) {
        self.values.extend(other.values);
        self.unresolved.extend(other.unresolved);
        self.issues.extend(other.issues);
    }
}

/// Resolves environment dependencies for one session.
#[derive(Debug)]
pub struct EnvironmentResolver {
    detector: AutoDetector,
    max_prompt_attempts: u32,
    handled: BTreeSet<String>,
}

impl EnvironmentResolver {
    pub fn new(detector: AutoDetector, max_prompt_attempts: u32) -> Self {
        Self {
            detector,
            max_prompt_attempts: max_prompt_attempts.max(1),
            handled: BTreeSet::new(),
        }
    }

    pub fn detector(&self) -> &AutoDetector {
        &self.detector
    }

    /// Detect values for `names` without prompting or side effects.
    pub fn auto_detect<I, S>(&self, names: I, env: &Environment) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.detector.detect_all(names, env)
    }

    /// Prompt for each dependency in order.
    ///
    /// Empty input skips an optional name and re-prompts a required one, up
    /// to the attempt limit. End of input stops prompting; remaining required
    /// names are reported unresolved.
    #[instrument(skip_all, fields(count = deps.len()))]
    pub fn interactive_resolve(
        &mut self,
        deps: &[EnvironmentDependency],
        prompter: &mut dyn Prompter,
    ) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let mut input_closed = false;

        for dep in deps {
            self.handled.insert(dep.name.clone());
            if input_closed {
                if dep.required {
                    resolution.unresolved.push(dep.name.clone());
                }
                continue;
            }

            let question = if dep.required {
                format!("{} (required): ", dep.name)
            } else {
                format!("{} (optional, Enter to skip): ", dep.name)
            };
            let mut attempts = 0;
            let value = loop {
                attempts += 1;
                let Some(answer) = prompter.ask(&question)? else {
                    input_closed = true;
                    break None;
                };
                let answer = answer.trim();
                if !answer.is_empty() {
                    break Some(answer.to_string());
                }
                if !dep.required {
                    break None;
                }
                if attempts >= self.max_prompt_attempts {
                    resolution.issues.push(Issue::exhausted(&dep.name, attempts));
                    break None;
                }
                prompter.say(&format!("{} is required.", dep.name))?;
            };

            match value {
                Some(value) => {
                    resolution.values.insert(dep.name.clone(), value);
                }
                None if dep.required => {
                    warn!(name = %dep.name, "required dependency left unresolved");
                    resolution.unresolved.push(dep.name.clone());
                }
                None => {}
            }
        }
        Ok(resolution)
    }

    /// Merge `values` into the live environment and its store.
    pub fn persist(&self, values: &BTreeMap<String, String>, env: &mut Environment) -> Result<()> {
        env.persist(values)?;
        if !values.is_empty() {
            info!(keys = values.len(), "environment values persisted");
        }
        Ok(())
    }

    /// Resolve `deps`: values already present are recorded, the rest are
    /// auto-detected, then prompted for when a prompter is given.
    ///
    /// Fills `value` on every dependency that ends up resolved. Dependencies
    /// handled earlier in the session are skipped. Nothing is persisted.
    #[instrument(skip_all, fields(count = deps.len(), interactive = prompter.is_some()))]
    pub fn resolve(
        &mut self,
        deps: &mut [EnvironmentDependency],
        env: &Environment,
        prompter: Option<&mut dyn Prompter>,
    ) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let mut pending = Vec::new();

        for dep in deps.iter_mut() {
            if let Some(value) = env.value(&dep.name) {
                dep.value = Some(value.to_string());
                self.handled.insert(dep.name.clone());
                continue;
            }
            if self.handled.contains(&dep.name) {
                continue;
            }
            self.handled.insert(dep.name.clone());
            match self.detector.detect(&dep.name, env) {
                Some(value) => {
                    resolution.values.insert(dep.name.clone(), value);
                }
                None => pending.push(dep.clone()),
            }
        }

        match prompter {
            Some(prompter) if !pending.is_empty() => {
                resolution.absorb(self.interactive_resolve(&pending, prompter)?);
            }
            _ => resolution.unresolved.extend(
                pending
                    .iter()
                    .filter(|dep| dep.required)
                    .map(|dep| dep.name.clone()),
            ),
        }

        for dep in deps.iter_mut() {
            if let Some(value) = resolution.values.get(&dep.name) {
                dep.value = Some(value.clone());
            }
        }
        debug!(
            resolved = resolution.values.len(),
            unresolved = resolution.unresolved.len(),
            "dependencies resolved"
        );
        Ok(resolution)
    }

    /// Allow `name` to be resolved again in this session.
    pub fn rerequest(&mut self, name: &str) {
        self.handled.remove(name);
    }
}
