//! Configuration file support for Hydro.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/hydro/config.toml`.

use crate::{Error, Result, UserProfile};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub profile: UserProfile,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub mock: MockConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

/// Bluetooth link timeouts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Upper bound for discovery, including the time spent in the chooser
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Upper bound for each GATT step (session, lookup, subscription)
    #[serde(default = "default_gatt_timeout_secs")]
    pub gatt_timeout_secs: u64,

    /// How long a real adapter scans before offering candidates
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: default_discovery_timeout_secs(),
            gatt_timeout_secs: default_gatt_timeout_secs(),
            scan_window_secs: default_scan_window_secs(),
        }
    }
}

impl LinkConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn gatt_timeout(&self) -> Duration {
        Duration::from_secs(self.gatt_timeout_secs)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.scan_window_secs)
    }
}

/// Mock intake generator parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_period_secs")]
    pub period_secs: u64,

    #[serde(default = "default_min_delta_ml")]
    pub min_delta_ml: u32,

    #[serde(default = "default_max_delta_ml")]
    pub max_delta_ml: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            period_secs: default_mock_period_secs(),
            min_delta_ml: default_min_delta_ml(),
            max_delta_ml: default_max_delta_ml(),
        }
    }
}

impl MockConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn delta_range(&self) -> RangeInclusive<u32> {
        self.min_delta_ml..=self.max_delta_ml
    }
}

/// Snapshot export configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

// Default value functions
fn default_discovery_timeout_secs() -> u64 {
    60
}

fn default_gatt_timeout_secs() -> u64 {
    15
}

fn default_scan_window_secs() -> u64 {
    5
}

fn default_mock_period_secs() -> u64 {
    12
}

fn default_min_delta_ml() -> u32 {
    15
}

fn default_max_delta_ml() -> u32 {
    59
}

fn default_export_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hydro")
        .join("exports")
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
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
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hydro")
            .join("config.toml")
    }

    /// Reject values the link and mock generator cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.profile.weight_kg.is_finite() {
            return Err(Error::Config("profile.weight_kg must be a number".into()));
        }
        if self.link.discovery_timeout_secs == 0 || self.link.gatt_timeout_secs == 0 {
            return Err(Error::Config("link timeouts must be at least 1 second".into()));
        }
        if self.mock.period_secs == 0 {
            return Err(Error::Config("mock.period_secs must be at least 1".into()));
        }
        if self.mock.min_delta_ml > self.mock.max_delta_ml {
            return Err(Error::Config(format!(
                "mock.min_delta_ml ({}) exceeds mock.max_delta_ml ({})",
                self.mock.min_delta_ml, self.mock.max_delta_ml
            )));
        }
        Ok(())
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
}
