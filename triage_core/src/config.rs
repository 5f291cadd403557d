//! Configuration file support.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/symptom-triage/config.toml`.

use crate::{Error, Result, ServiceOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the reference data lives
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Directory holding the three catalog JSON files; built-in catalog if unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Session lifetime configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Evict sessions idle for this many minutes; never when unset
    #[serde(default)]
    pub idle_timeout_minutes: Option<u32>,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

impl SessionConfig {
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            idle_timeout: self
                .idle_timeout_minutes
                .map(|m| chrono::Duration::minutes(i64::from(m))),
        }
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.check()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("symptom-triage").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.sessions.idle_timeout_minutes == Some(0) {
            return Err(Error::Config(
                "sessions.idle_timeout_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
