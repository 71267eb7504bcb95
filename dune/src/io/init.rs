//! Working-directory layout and bootstrap of pipeline directories.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::config::{DuneSettings, SETTINGS_FILE};

/// Default output directory, also the built-in `DUNE_OUTPUT_DIR` value.
pub const OUTPUT_DIR: &str = "output";

/// All canonical paths for a working root.
#[derive(Debug, Clone)]
pub struct DunePaths {
    pub root: PathBuf,
    pub settings_path: PathBuf,
    pub env_path: PathBuf,
    pub configs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl DunePaths {
    /// Paths under `root` with settings-relative locations resolved.
    pub fn new(root: impl Into<PathBuf>, settings: &DuneSettings) -> Self {
        let root = root.into();
        Self {
            settings_path: root.join(SETTINGS_FILE),
            env_path: root.join(&settings.env_file),
            configs_dir: root.join(&settings.configs_dir),
            output_dir: root.join(OUTPUT_DIR),
            root,
        }
    }

    /// Use `dir` (absolute, or relative to the root) as the output directory.
    pub fn with_output_dir(mut self, dir: &str) -> Self {
        self.output_dir = self.root.join(dir);
        self
    }

    /// Where a document with `name` is saved by default.
    pub fn document_path(&self, name: &str) -> PathBuf {
        self.configs_dir.join(format!("{name}.yaml"))
    }
}

/// Create the configs and output directories if missing. Idempotent.
pub fn bootstrap(paths: &DunePaths) -> Result<()> {
    create_dir(&paths.configs_dir)?;
    create_dir(&paths.output_dir)?;
    debug!(root = %paths.root.display(), "working directories ready");
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
