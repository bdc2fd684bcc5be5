use crate::core::relay::RelaySettings;
use crate::domain::error::{HubError, HubResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hub configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Default log level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bound on a single blocking read, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Pause after an unexpected I/O failure, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// TCP port used by `loopback` when none is given
    #[serde(default = "default_loopback_port")]
    pub default_loopback_port: u16,
    /// Start with byte-level tracing on
    #[serde(default)]
    pub trace_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_read_timeout_ms() -> u64 {
    100
}

fn default_backoff_ms() -> u64 {
    10
}

fn default_loopback_port() -> u16 {
    9600
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            read_timeout_ms: default_read_timeout_ms(),
            backoff_ms: default_backoff_ms(),
            default_loopback_port: default_loopback_port(),
            trace_enabled: false,
        }
    }
}

impl HubConfig {
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Loads hub configuration from the global and project-local files.
pub struct ConfigManager {
    global_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            global_config_path: Self::global_config_path(),
            project_config_path: Self::find_project_config_path(),
        }
    }

    /// Load configuration, project file taking precedence over the global
    /// one, defaults filling in for whatever is missing.
    pub fn load_config(&self) -> HubResult<HubConfig> {
        let path = self
            .project_config_path
            .as_deref()
            .filter(|p| p.exists())
            .or(self.global_config_path.as_deref().filter(|p| p.exists()));

        match path {
            Some(path) => Self::load_config_from_path(path),
            None => Ok(HubConfig::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_config_from_path(path: &Path) -> HubResult<HubConfig> {
        let content = fs::read_to_string(path).map_err(|e| HubError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| HubError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(home.join(".config").join("serialhub").join("config.toml"))
    }

    /// Walk up from the current directory looking for `.serialhub/config.toml`.
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(".serialhub").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
