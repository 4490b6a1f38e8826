use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{DelayPolicy, DurationUnit};

/// Top-level configuration for the holdoff harness.
///
/// Loaded from `~/.holdoff/config.toml` by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldoffConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub delay: DelayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl HoldoffConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HoldoffConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Data directory with a leading `~` expanded against `$HOME`.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the SQLite database and the simulated device state.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.holdoff/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Seed values for the delay policy.
///
/// Only consulted when the database has no stored policy yet; afterwards
/// the persisted policy wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub enabled: bool,
    pub duration_value: u32,
    pub duration_unit: DurationUnit,
}

impl Default for DelayConfig {
    fn default() -> Self {
        let policy = DelayPolicy::default();
        Self {
            enabled: policy.enabled,
            duration_value: policy.duration_value,
            duration_unit: policy.duration_unit,
        }
    }
}

impl DelayConfig {
    pub fn to_policy(&self) -> DelayPolicy {
        DelayPolicy {
            enabled: self.enabled,
            duration_value: self.duration_value,
            duration_unit: self.duration_unit,
        }
    }
}

/// Background scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between ticks.
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
