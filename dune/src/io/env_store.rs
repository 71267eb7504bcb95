//! Environment context and the durable `.env` store behind it.
//!
//! The process environment is read once at capture and never mutated;
//! resolved values live in [`Environment`] and are handed to child processes
//! explicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::{debug, instrument};

use super::config::write_atomic;

static VAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern should be valid")
});

/// Flat `KEY=VALUE` file holding resolved dependency values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvStore {
    path: PathBuf,
}

impl EnvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries of the store. A missing file is an empty store.
    pub fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let iter = dotenvy::from_path_iter(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let mut entries = BTreeMap::new();
        for item in iter {
            let (key, value) = item.with_context(|| format!("parse {}", self.path.display()))?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    /// Merge `values` into the file.
    ///
    /// Lines for keys in `values` are rewritten in place; every other line
    /// (keys, comments, blanks) is kept as is. Keys not yet present are
    /// appended. Merging the same mapping twice yields the same file.
    #[instrument(skip_all, fields(path = %self.path.display(), keys = values.len()))]
    pub fn merge(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let existing = if self.path.exists() {
            fs::read_to_string(&self.path)
                .with_context(|| format!("read {}", self.path.display()))?
        } else {
            String::new()
        };

        let mut seen = BTreeSet::new();
        let mut lines: Vec<String> = Vec::new();
        for line in existing.lines() {
            match line_key(line).and_then(|key| values.get_key_value(key)) {
                Some((key, value)) => {
                    seen.insert(key.as_str());
                    lines.push(format_entry(key, value));
                }
                None => lines.push(line.to_string()),
            }
        }
        for (key, value) in values {
            if !seen.contains(key.as_str()) {
                lines.push(format_entry(key, value));
            }
        }

        let mut buf = lines.join("\n");
        buf.push('\n');
        write_atomic(&self.path, &buf)?;
        debug!("env store updated");
        Ok(())
    }
}

/// Key assigned on a `.env` line, if the line is an assignment.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, _) = trimmed.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}

fn format_entry(key: &str, value: &str) -> String {
    format!("{key}={}", quote_value(value))
}

/// Quote a value so that dotenv parsers read it back verbatim.
fn quote_value(value: &str) -> String {
    let bare = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@,+".contains(c));
    if bare {
        return value.to_string();
    }
    if !value.contains('\'') && !value.contains('\n') {
        return format!("'{value}'");
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '$' => quoted.push_str("\\$"),
            '\n' => quoted.push_str("\\n"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Variables visible to the pipeline plus the store that persists them.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    store: Option<EnvStore>,
}

impl Environment {
    /// Snapshot process variables over the store's entries.
    ///
    /// Process variables win, as with dotenv loading.
    pub fn capture(store: EnvStore) -> Result<Self> {
        let mut vars = store.load()?;
        for (key, value) in std::env::vars_os() {
            if let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) {
                vars.insert(key, value);
            }
        }
        Ok(Self {
            vars,
            store: Some(store),
        })
    }

    /// In-memory environment without a store.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: EnvStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&EnvStore> {
        self.store.as_ref()
    }

    /// Raw value, possibly empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Value if present and not blank.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.trim().is_empty())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Apply `values` to the live environment, then merge them into the store.
    ///
    /// The live environment is updated even when the store write fails.
    pub fn persist(&mut self, values: &BTreeMap<String, String>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        for (key, value) in values {
            self.vars.insert(key.clone(), value.clone());
        }
        match &self.store {
            Some(store) => store.merge(values),
            None => Ok(()),
        }
    }

    /// Replace `${VAR}` references with their values; unknown ones stay verbatim.
    pub fn expand(&self, text: &str) -> String {
        VAR_REF
            .replace_all(text, |caps: &Captures<'_>| match self.value(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
