use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "TOYBOX_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read runtime config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("visibility threshold must be within 0.0..=1.0, got {0}")]
    Threshold(f64),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Fraction of an article that must be on screen before its toy loads.
    pub visibility_threshold: f64,
    pub frame_interval_ms: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.1,
            frame_interval_ms: 16,
            fetch_timeout_secs: 10,
            user_agent: format!("toybox/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RuntimeConfig {
    /// Reads the YAML file at `config_path`. A missing path or file yields
    /// the defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                if contents.trim().is_empty() {
                    Self::default()
                } else {
                    serde_yaml::from_str(&contents)?
                }
            }
            _ => Self::default(),
        };

        if !(0.0..=1.0).contains(&config.visibility_threshold) {
            return Err(ConfigError::Threshold(config.visibility_threshold));
        }
        Ok(config)
    }

    /// Uses `$TOYBOX_CONFIG` when set, else `toybox.yaml` in the platform
    /// config directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(default_config_path())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    ProjectDirs::from("dev", "toybox", "toybox").map(|dirs| dirs.config_dir().join("toybox.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_default() {
        let config = RuntimeConfig::load(None).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.visibility_threshold, 0.1);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load(Some(dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.frame_interval_ms, 16);
    }

    #[test]
    fn loads_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "visibility_threshold: 0.5\nfetch_timeout_secs: 3").unwrap();
        let config = RuntimeConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.visibility_threshold, 0.5);
        assert_eq!(config.fetch_timeout_secs, 3);
        assert_eq!(config.frame_interval_ms, 16);
    }

    #[test]
    fn empty_file_is_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = RuntimeConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "visibility_threshold: 1.5").unwrap();
        let err = RuntimeConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Threshold(_)));
    }

    #[test]
    fn reports_yaml_errors() {
        let mut file = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "frame_interval_ms: [not, a, number]").unwrap();
        let err = RuntimeConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
