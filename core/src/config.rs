//! Configuration management (`config.toml`)
//!
//! Handles loading, saving, and providing defaults for relay settings.
//! Settings are stored in TOML format in the platform-specific config directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use framerelay_shared::{DEFAULT_CHUNK_COUNT, DEFAULT_MAP_PREFIX};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Relay configuration.
///
/// Every field has a serde default, so an empty or partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// Mapping naming and backing store
    #[serde(default)]
    pub mapping: MappingConfig,
    /// Parallel publish settings
    #[serde(default)]
    pub publish: PublishConfig,
    /// Target process wait settings
    #[serde(default)]
    pub watch: WatchConfig,
}

/// How pixels left over after `N / chunk_count` are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// The last chunk extends to the end of the frame
    #[default]
    LastChunk,
    /// Leftover pixels are not published
    Truncate,
}

/// Mapping naming and backing store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Name prefix (default: "framerelay")
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Optional session/map label inserted into the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Directory holding mapping backing files (default: `<tmp>/framerelay`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

/// Parallel publish configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Number of chunks (and worker threads) per frame (default: 8)
    #[serde(default = "default_chunk_count")]
    pub chunk_count: usize,
    /// Remainder handling (default: last_chunk)
    #[serde(default)]
    pub remainder: RemainderPolicy,
    /// Render + readback + publish time above which a warning is logged (default: 8ms)
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,
}

/// Target process wait configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Longest single wait for the target process to appear (default: 10s)
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

fn default_prefix() -> String {
    DEFAULT_MAP_PREFIX.to_string()
}
fn default_chunk_count() -> usize {
    DEFAULT_CHUNK_COUNT
}
fn default_budget_ms() -> u64 {
    8
}
fn default_wait_timeout_ms() -> u64 {
    10_000
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            label: None,
            work_dir: None,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            chunk_count: default_chunk_count(),
            remainder: RemainderPolicy::default(),
            budget_ms: default_budget_ms(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl MappingConfig {
    /// Resolved working directory for backing files.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_MAP_PREFIX))
    }
}

impl PublishConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

impl WatchConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl RelayConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish.chunk_count == 0 {
            return Err(ConfigError::Invalid(
                "publish.chunk_count must be at least 1".to_string(),
            ));
        }
        if self.mapping.prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "mapping.prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Windows: `%APPDATA%\FrameRelay\config`
/// On macOS: `~/Library/Application Support/io.framerelay.FrameRelay`
/// On Linux: `~/.config/FrameRelay`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.framerelay", "", "FrameRelay")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from the platform config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> RelayConfig {
    config_dir()
        .and_then(|dir| std::fs::read_to_string(dir.join("config.toml")).ok())
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default()
}

/// Loads and validates the configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RelayConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Saves the configuration to an explicit path, creating parent directories.
pub fn save_to(config: &RelayConfig, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(write_err)
}
