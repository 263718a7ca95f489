//! `buildmap.toml` configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::DEFAULT_MANIFEST_PATH;

/// Top-level `buildmap.toml` contents
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// `[stage]` table
    #[serde(default)]
    pub stage: StageConfig,
}

/// Inputs of the manifest stage factory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Emit debounced manifest snapshots downstream
    #[serde(default = "default_write_manifest_file")]
    pub write_manifest_file: bool,
    /// Root of the build output
    #[serde(default = "default_build_folder")]
    pub build_folder: PathBuf,
    /// Production skips loading a persisted manifest
    #[serde(default)]
    pub environment: Environment,
    /// Snapshot location relative to `build_folder`
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
}

/// Server environment the pipeline runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local dev server
    #[default]
    #[serde(alias = "dev")]
    Development,
    /// Production build
    #[serde(alias = "prod")]
    Production,
    /// Test runs
    Test,
}

impl Environment {
    /// Production builds never reuse a persisted manifest
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        })
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(anyhow::anyhow!("Unknown environment: {s}")),
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            write_manifest_file: default_write_manifest_file(),
            build_folder: default_build_folder(),
            environment: Environment::default(),
            manifest_path: default_manifest_path(),
        }
    }
}

impl StageConfig {
    /// Full path of the snapshot file
    #[must_use]
    pub fn manifest_file(&self) -> PathBuf {
        self.build_folder.join(&self.manifest_path)
    }

    /// Check the configuration for values the stage cannot work with
    ///
    /// # Errors
    ///
    /// Returns an error if `manifest_path` is empty or absolute
    pub fn validate(&self) -> Result<()> {
        if self.manifest_path.trim().is_empty() {
            anyhow::bail!("manifest_path must not be empty");
        }
        if Path::new(&self.manifest_path).is_absolute() {
            anyhow::bail!(
                "manifest_path must be relative to the build folder: {}",
                self.manifest_path
            );
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File exists but cannot be read
    /// - File contains invalid TOML
    /// - The stage settings fail validation
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .stage
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

// Default functions for serde
const fn default_write_manifest_file() -> bool {
    true
}

fn default_build_folder() -> PathBuf {
    PathBuf::from(".build")
}

fn default_manifest_path() -> String {
    DEFAULT_MANIFEST_PATH.to_string()
}
