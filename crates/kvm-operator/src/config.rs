//! Operator process configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "KVM_OPERATOR_CONFIG";

/// Default port for the health and metrics server
pub const DEFAULT_HEALTH_PORT: u16 = 8081;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Port of the health and metrics server
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    /// Seconds between passes for an unchanged cluster
    #[serde(default = "default_resync_interval")]
    pub resync_interval_seconds: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_health_port() -> u16 {
    DEFAULT_HEALTH_PORT
}

fn default_resync_interval() -> u64 {
    300 // 5 minutes
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            health_port: default_health_port(),
            resync_interval_seconds: default_resync_interval(),
            log_format: LogFormat::default(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `KVM_OPERATOR_CONFIG`, or use defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_port == 0 {
            return Err(ConfigError::Invalid("healthPort must not be 0".to_string()));
        }
        if self.resync_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "resyncIntervalSeconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_seconds)
    }
}
