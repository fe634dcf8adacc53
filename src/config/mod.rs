//! Configuration module for pipefan
//!
//! This module handles the engine configuration:
//! - Agent defaults applied by the compiler (queue capacity, pool sizes)
//! - Logging (filter, optional log file, packet tracing)
//! - The data location processors may keep state in
//! - Pipelines the runner starts at boot
//!
//! # Data Location
//!
//! Unless configured, processor state lives in the platform data directory:
//! - **Linux**: `~/.local/share/pipefan/data/`
//! - **macOS**: `~/Library/Application Support/pipefan/data/`
//! - **Windows**: `%APPDATA%\pipefan\data\`
//!
//! # Example
//!
//! ```toml
//! data_location = "/var/lib/pipefan"
//!
//! [log]
//! level = "info"
//! file = "/var/log/pipefan/engine.log"
//!
//! [defaults]
//! buffer = 64
//! filter_workers = 4
//!
//! [[pipelines]]
//! name = "syslog"
//! location = "pipelines/syslog.json"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "pipefan";

/// Engine configuration filename
pub const ENGINE_CONFIG_FILE: &str = "engine.toml";

/// Subdirectory of the app data directory used as the default data location
pub const DATA_DIR: &str = "data";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Create `dir` if it doesn't exist
pub fn ensure_dir(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", dir, e))
        })?;
    }
    Ok(dir.to_path_buf())
}

// ==================== Engine Configuration ====================

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory processors may keep state in
    #[serde(default)]
    pub data_location: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub log: LogSettings,

    /// Defaults applied to compiled agents
    #[serde(default)]
    pub defaults: AgentDefaults,

    /// Pipelines started by the runner
    #[serde(default)]
    pub pipelines: Vec<PipelineEntry>,
}

impl EngineConfig {
    /// Default location of the engine configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_ID).join(ENGINE_CONFIG_FILE))
    }

    /// Load the configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read engine config {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            EngineError::Config(format!("Failed to parse engine config {:?}: {}", path, e))
        })
    }

    /// Load the configuration or fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default engine config: {}", e);
                Self::default()
            }
        }
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize engine config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            EngineError::Config(format!("Failed to write engine config {:?}: {}", path, e))
        })
    }

    /// The configured data location, or the platform default
    pub fn data_location(&self) -> PathBuf {
        self.data_location
            .clone()
            .or_else(|| app_data_dir().map(|p| p.join(DATA_DIR)))
            .unwrap_or_else(|| std::env::temp_dir().join(APP_ID))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.data_location.is_none());
        assert!(config.pipelines.is_empty());
        assert_eq!(config.defaults, AgentDefaults::default());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            data_location = "/var/lib/pipefan"

            [defaults]
            filter_workers = 4

            [[pipelines]]
            location = "main.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_location(), PathBuf::from("/var/lib/pipefan"));
        assert_eq!(config.defaults.filter_workers, 4);
        assert_eq!(config.defaults.buffer, DEFAULT_BUFFER);
        assert_eq!(config.pipelines[0].location, "main.json");
        assert_eq!(config.pipelines[0].name, None);
        assert_eq!(config.log, LogSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(ENGINE_CONFIG_FILE);

        let mut config = EngineConfig::default();
        config.defaults.buffer = 128;
        config.log.verbose = true;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.toml")),
            Err(EngineError::Config(_))
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "defaults = 3").unwrap();
        assert!(EngineConfig::load(&bad).is_err());
        assert_eq!(EngineConfig::load_or_default(&bad), EngineConfig::default());
    }

    #[test]
    fn test_ensure_dir() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        assert_eq!(ensure_dir(&target).unwrap(), target);
        assert!(target.is_dir());
    }
}
