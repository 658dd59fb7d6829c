//! Host application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_core::scheduler::TaskFailurePolicy;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::host::HostSettings;
use crate::HostError;

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub plugins: PluginSettings,
    pub runtime: RuntimeSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directory scanned for plugin manifests.
    pub directory: String,
    /// Base directory for per-plugin config files.
    pub config_directory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Milliseconds per server tick (50 = 20 ticks per second).
    pub tick_interval_ms: u64,
    /// Listener/executor/task calls slower than this get reported.
    pub slow_call_threshold_ms: u64,
    /// Cancel a repeating task whose iteration panicked.
    pub cancel_repeating_on_panic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter.
    pub level: String,
    /// JSON formatting.
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugins: PluginSettings {
                directory: "plugins".to_string(),
                config_directory: "plugin-configs".to_string(),
            },
            runtime: RuntimeSettings {
                tick_interval_ms: 50,
                slow_call_threshold_ms: 25,
                cancel_repeating_on_panic: false,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, writing a default file when none
    /// exists yet.
    pub async fn load_or_create(path: &Path) -> Result<Self, HostError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            toml::from_str(&content).map_err(|e| HostError::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        } else {
            let config = AppConfig::default();
            let content = toml::to_string_pretty(&config).map_err(|e| HostError::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            tokio::fs::write(path, content).await?;
            info!("created default configuration file: {}", path.display());
            Ok(config)
        }
    }

    pub fn host_settings(&self) -> HostSettings {
        HostSettings {
            plugin_dir: PathBuf::from(&self.plugins.directory),
            config_dir: PathBuf::from(&self.plugins.config_directory),
            slow_call_threshold: Duration::from_millis(self.runtime.slow_call_threshold_ms),
            task_failure_policy: if self.runtime.cancel_repeating_on_panic {
                TaskFailurePolicy::CancelRepeating
            } else {
                TaskFailurePolicy::KeepRepeating
            },
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_config_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.toml");

        let config = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(config.runtime.tick_interval_ms, 50);
        assert!(path.exists());

        // Second load reads the file it just wrote.
        let reloaded = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded.plugins.directory, "plugins");
    }
}
