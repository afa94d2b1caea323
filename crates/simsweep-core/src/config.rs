//! Persistent configuration for simsweep.
//!
//! Stores user settings in `~/.simsweep/config.json`. Both settings are
//! optional: a developer directory to use for `xcrun simctl` when
//! `xcode-select` points somewhere unhelpful, and a per-command timeout.
//!
//! # Example
//!
//! ```no_run
//! use simsweep_core::config::SweepConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = SweepConfig::load();
//!
//! if let Some(dir) = &config.developer_dir {
//!     println!("simctl uses: {}", dir.display());
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIRNAME: &str = ".simsweep";
const CONFIG_FILENAME: &str = "config.json";

/// Errors from saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHome,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent simsweep configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SweepConfig {
    /// Developer directory exported as `DEVELOPER_DIR` to simctl calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_dir: Option<PathBuf>,

    /// Timeout applied to each external command, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

/// `~/.simsweep`, or `None` when there is no home directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIRNAME))
}

impl SweepConfig {
    /// Load config from `~/.simsweep/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        config_dir()
            .map(|dir| Self::load_from(&dir.join(CONFIG_FILENAME)))
            .unwrap_or_default()
    }

    /// Load config from an explicit path, with the same fallback as [`load`](Self::load).
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to `~/.simsweep/config.json`, creating the directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        let dir = config_dir().ok_or(ConfigError::NoHome)?;
        self.save_to(&dir.join(CONFIG_FILENAME))
    }

    /// Save config as pretty JSON to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// The configured command timeout.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let config = SweepConfig::default();
        assert!(config.developer_dir.is_none());
        assert!(config.command_timeout().is_none());
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: SweepConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, SweepConfig::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);
        let config = SweepConfig {
            developer_dir: Some(PathBuf::from("/Applications/Xcode-beta.app/Contents/Developer")),
            command_timeout_secs: Some(120),
        };
        config.save_to(&path).unwrap();

        let loaded = SweepConfig::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.command_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn load_falls_back_on_garbage_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        assert_eq!(SweepConfig::load_from(&path), SweepConfig::default());

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(SweepConfig::load_from(&path), SweepConfig::default());
    }
}
