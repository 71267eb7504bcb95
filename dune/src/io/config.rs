//! Pipeline settings stored in `dune.toml` next to the working directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::mapper::DEFAULT_MATCH_THRESHOLD;

/// Settings filename, resolved against the working root.
pub const SETTINGS_FILE: &str = "dune.toml";

/// Pipeline settings (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DuneSettings {
    /// Minimum keyword score for a provider to match a task.
    pub match_threshold: u32,

    /// Prompts per required dependency before it is recorded unresolved.
    pub max_prompt_attempts: u32,

    /// Offer/repair/re-validate rounds before giving up.
    pub max_repair_rounds: u32,

    /// Durable environment store, relative to the working root.
    pub env_file: PathBuf,

    /// Where documents are saved by name.
    pub configs_dir: PathBuf,

    /// Provider catalog file. The embedded catalog is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// Extra alternate variable names per dependency, tried in order.
    pub aliases: BTreeMap<String, Vec<String>>,

    pub executor: ExecutorSettings,

    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Command receiving the request text on stdin (e.g. `["dune-exec"]`).
    pub command: Vec<String>,

    /// Wall-clock limit for one execution, in seconds.
    pub timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmSettings {
    /// Fallback when `OLLAMA_BASE_URL` is unset.
    pub base_url: String,
    /// Fallback when `OLLAMA_MODEL` is unset.
    pub model: String,
}

impl Default for DuneSettings {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            max_prompt_attempts: 3,
            max_repair_rounds: 2,
            env_file: PathBuf::from(".env"),
            configs_dir: PathBuf::from("configs"),
            catalog_path: None,
            aliases: BTreeMap::new(),
            executor: ExecutorSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            command: vec!["dune-exec".to_string()],
            timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mistral:7b".to_string(),
        }
    }
}

impl DuneSettings {
    pub fn validate(&self) -> Result<()> {
        if self.match_threshold == 0 {
            return Err(anyhow!("match_threshold must be > 0"));
        }
        if self.max_prompt_attempts == 0 {
            return Err(anyhow!("max_prompt_attempts must be > 0"));
        }
        if self.max_repair_rounds == 0 {
            return Err(anyhow!("max_repair_rounds must be > 0"));
        }
        if self.env_file.as_os_str().is_empty() {
            return Err(anyhow!("env_file must be non-empty"));
        }
        if self.configs_dir.as_os_str().is_empty() {
            return Err(anyhow!("configs_dir must be non-empty"));
        }
        for (name, alternates) in &self.aliases {
            if name.trim().is_empty() || alternates.iter().any(|alt| alt.trim().is_empty()) {
                return Err(anyhow!("aliases must map non-empty names to non-empty names"));
            }
        }
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        if self.executor.command.is_empty() || self.executor.command[0].trim().is_empty() {
            return Err(anyhow!("executor.command must be a non-empty array"));
        }
        if self.llm.base_url.trim().is_empty() || self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.base_url and llm.model must be non-empty"));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `DuneSettings::default()`.
pub fn load_settings(path: &Path) -> Result<DuneSettings> {
    if !path.exists() {
        let settings = DuneSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: DuneSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
#[cfg(test)]
pub fn write_settings(path: &Path, settings: &DuneSettings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` to a sibling temp file, then rename over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
