//! Application configuration
//!
//! TOML configuration file with sensible defaults: cache location, logging
//! and the pipeline constants. Lives under the platform config directory
//! unless a path is given on the command line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RunTrendError};
use crate::logging::LogConfig;
use crate::windowing::PipelineConfig;

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LogConfig,
    pub pipeline: PipelineConfig,
}

/// Cache database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite activity cache
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("runtrend").join("activities.db"),
        }
    }
}

impl AppConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("runtrend").join("config.toml")
    }

    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(|e| {
            RunTrendError::Configuration(format!(
                "invalid config file {}: {e}",
                path.as_ref().display()
            ))
        })
    }

    /// Load the file at `path` (or the default location), falling back to
    /// defaults when no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| RunTrendError::Configuration(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windowing::DEFAULT_WINDOW_DURATION_SECS;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(
            config.pipeline.window_duration_secs,
            DEFAULT_WINDOW_DURATION_SECS
        );
        assert!(config.database.path.ends_with("runtrend/activities.db"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.pipeline.window_duration_secs = 120.0;
        config.database.path = PathBuf::from("/tmp/cache.db");
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nstd_threshold = 7.5\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.pipeline.std_threshold, 7.5);
        assert_eq!(
            config.pipeline.window_duration_secs,
            DEFAULT_WINDOW_DURATION_SECS
        );
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = AppConfig::load_or_default(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.unwrap(), AppConfig::default());
    }
}
