//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

fn default_templates_dir() -> PathBuf {
    PathBuf::from("./templates")
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Where templates are loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TemplatesConfig {
    /// The base directory of the template cache. May be relative to the working directory.
    #[serde(default = "default_templates_dir")]
    pub dir: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
        }
    }
}

/// Settings for the `watch` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WatchConfig {
    /// How often the template is re-checked for changes, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.templates.dir.as_os_str().is_empty() {
            errors.push("Templates directory must not be empty.".to_owned());
        }

        if self.watch.poll_interval_ms == 0 {
            errors.push("Watch poll interval must be greater than zero.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("mache").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("mache").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/mache/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the first found config file, or the external path if given.
    pub fn load(external_config_path: Option<&Path>) -> Option<Result<Self, ConfigError>> {
        if let Some(path) = external_config_path {
            return Some(Self::load_from_file(path));
        }

        Self::find_config_file().map(|path| Self::load_from_file(&path))
    }

    /// Loads config, falling back to defaults if no config file exists.
    /// Errors if a config file exists but is malformed or invalid.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(res) = Self::load(external_config_path) else {
            debug!("No configuration file found, using defaults.");
            return Ok(Self::default());
        };

        let config = res?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        debug!("Loaded configuration successfully.");
        Ok(config)
    }
}
