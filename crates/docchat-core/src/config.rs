//! Configuration management for docchat.
//!
//! Loads configuration from ${DOCCHAT_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the API base address.
pub const API_URL_ENV: &str = "DOCCHAT_API_URL";

/// Base address used when neither env nor config provide one.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// API connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base address of the docchat API.
    pub base_url: Option<String>,
}

/// Where exported files are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub dir: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub download: DownloadConfig,
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default config to `path`.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Resolves the API base address: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the chosen address is not a valid URL.
    pub fn api_base_url(&self) -> Result<String> {
        resolve_base_url(
            std::env::var(API_URL_ENV).ok().as_deref(),
            self.api.base_url.as_deref(),
        )
    }

    /// Directory for exported files (defaults to the current directory).
    pub fn download_dir(&self) -> PathBuf {
        self.download
            .dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Picks the first non-blank of `env_url` and `config_url`, else the default.
///
/// # Errors
/// Returns an error if the chosen value does not parse as a URL.
pub fn resolve_base_url(env_url: Option<&str>, config_url: Option<&str>) -> Result<String> {
    let chosen = [env_url, config_url]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty());

    match chosen {
        Some(url) => {
            url::Url::parse(url).with_context(|| format!("Invalid API base URL: {url}"))?;
            Ok(url.trim_end_matches('/').to_string())
        }
        None => Ok(DEFAULT_API_URL.to_string()),
    }
}

pub mod paths {
    //! Path resolution for docchat configuration and data directories.
    //!
    //! DOCCHAT_HOME resolution order:
    //! 1. DOCCHAT_HOME environment variable (if set)
    //! 2. ~/.config/docchat (default)

    use std::path::PathBuf;

    /// Returns the docchat home directory.
    pub fn docchat_home() -> PathBuf {
        if let Ok(home) = std::env::var("DOCCHAT_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".docchat"),
            |h| h.join(".config").join("docchat"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        docchat_home().join("config.toml")
    }

    /// Returns the directory holding persisted session keys.
    pub fn storage_dir() -> PathBuf {
        docchat_home().join("storage")
    }
}
