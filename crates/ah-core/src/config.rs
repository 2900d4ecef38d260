//! Host configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "asio-host";
/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Host configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Driver and stream settings
    pub driver: DriverConfig,
    /// Logging settings
    pub debug: DebugConfig,
}

/// Driver and stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver to open when none is named explicitly
    pub name: Option<String>,
    /// Sample rate requested at configure time
    pub sample_rate: f64,
    /// Buffer size in frames; the driver's preferred size when unset
    pub buffer_size: Option<i32>,
    /// Number of input channels to create buffers for
    pub input_channels: u32,
    /// Number of output channels to create buffers for
    pub output_channels: u32,
    /// Answer the driver's time-info capability probe with yes
    pub time_info: bool,
    /// Capacity of the realtime event queue
    pub event_queue_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: None,
            sample_rate: 44100.0,
            buffer_size: None,
            input_channels: 0,
            output_channels: 2,
            time_info: true,
            event_queue_capacity: 64,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level
    pub log_level: LogLevel,
    /// Also write logs to `log_path`
    pub log_to_file: bool,
    /// Log file location
    pub log_path: PathBuf,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("asio-host.log"),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the config from the default location.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load the config from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save the config to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.driver.sample_rate, 44100.0);
        assert_eq!(config.driver.output_channels, 2);
        assert!(config.driver.buffer_size.is_none());
        assert_eq!(config.debug.log_level, LogLevel::Info);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [driver]
            name = "Null Driver"
            buffer_size = 256

            [debug]
            log_level = "trace"
            "#,
        )
        .unwrap();

        assert_eq!(config.driver.name.as_deref(), Some("Null Driver"));
        assert_eq!(config.driver.buffer_size, Some(256));
        assert_eq!(config.driver.sample_rate, 44100.0);
        assert_eq!(config.debug.log_level, LogLevel::Trace);
        assert!(!config.debug.log_to_file);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.driver.sample_rate = 48000.0;
        config.driver.input_channels = 4;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[driver]\nsample_rate = \"fast\"\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
