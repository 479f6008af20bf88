//! Configuration file handling for elmdiag
//!
//! One TOML file holds both the front-end preferences and the engine's
//! `[scan]` and `[transport]` tables.

use anyhow::{Context, Result};
use elmdiag_engine::ElmdiagConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Scan history file
    pub history: Option<PathBuf>,
    /// Engine settings
    #[serde(flatten)]
    pub engine: ElmdiagConfig,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.engine.scan.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("elmdiag");

        Ok(config_dir.join("config.toml"))
    }

    /// Default scan history location
    pub fn history_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Could not determine data directory")?
            .join("elmdiag");

        Ok(data_dir.join("history.json"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        output: Option<&str>,
        no_color: bool,
        history: Option<&Path>,
    ) -> Result<MergedConfig> {
        let history = match history.map(Path::to_path_buf).or_else(|| self.history.clone()) {
            Some(path) => path,
            None => Self::history_path()?,
        };
        Ok(MergedConfig {
            output: output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: no_color || self.no_color.unwrap_or(false),
            history,
        })
    }
}

/// Fully resolved front-end settings after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub output: String,
    pub no_color: bool,
    pub history: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_load_combined_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
output = "json"
history = "/tmp/scans.json"

[scan]
double_check = false
mode03_timeout_ms = 9000

[transport]
type = "mock"
latency_ms = 5

[[transport.rules]]
header = "7E0"
command = "03"
replies = ["43 01 03 00"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.output.as_deref(), Some("json"));
        assert!(!config.engine.scan.double_check);
        assert_eq!(config.engine.scan.mode03_timeout_ms, 9000);
        let elmdiag_engine::TransportConfig::Mock(mock) = &config.engine.transport;
        assert_eq!(mock.latency_ms, 5);
        assert_eq!(mock.rules.len(), 1);
    }

    #[test]
    fn test_invalid_scan_settings_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\nstatus_masks = []\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("status_masks"));
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            output: Some("json".to_string()),
            no_color: Some(true),
            history: Some(PathBuf::from("/var/lib/elmdiag/history.json")),
            ..Config::default()
        };

        let merged = config
            .merge_with_args(Some("csv"), false, Some(Path::new("scans.json")))
            .unwrap();
        assert_eq!(merged.output, "csv");
        assert!(merged.no_color);
        assert_eq!(merged.history, PathBuf::from("scans.json"));

        let merged = config.merge_with_args(None, false, None).unwrap();
        assert_eq!(merged.output, "json");
        assert_eq!(merged.history, PathBuf::from("/var/lib/elmdiag/history.json"));
    }
}
