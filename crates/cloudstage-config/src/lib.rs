//! cloudstage settings
//!
//! Settings live in a YAML file. Every key is optional:
//!
//! ```yaml
//! region: ord
//! poll_interval_ms: 5000
//! server_timeout_secs: 1200
//! image_timeout_secs: 3600
//! state_dir: /var/lib/cloudstage
//! sandbox:
//!   ready_after_polls: 2
//!   address_lag_polls: 1
//! ```

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "CLOUDSTAGE_CONFIG";

const APP_DIR: &str = "cloudstage";
const LOCAL_CANDIDATES: [&str; 2] = ["cloudstage.yaml", ".cloudstage.yaml"];
const GLOBAL_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub region: String,
    pub poll_interval_ms: u64,
    pub server_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub state_dir: Option<PathBuf>,
    pub sandbox: SandboxSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: "dfw".to_string(),
            poll_interval_ms: 5000,
            server_timeout_secs: 1200,
            image_timeout_secs: 3600,
            state_dir: None,
            sandbox: SandboxSettings::default(),
        }
    }
}

/// Simulation tuning for the sandbox provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub ready_after_polls: u32,
    pub address_lag_polls: u32,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            ready_after_polls: 2,
            address_lag_polls: 1,
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        // an empty file deserializes to null
        let settings: Settings = if content.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        settings.validate()?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    /// Configured state directory, or `<data_dir>/cloudstage`
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir()
                .ok_or(ConfigError::DataDirNotFound)?
                .join(APP_DIR)),
        }
    }
}

/// Find the settings file.
///
/// Search order:
/// 1. `CLOUDSTAGE_CONFIG` (must exist when set)
/// 2. current directory: `cloudstage.yaml`, `.cloudstage.yaml`
/// 3. `<config_dir>/cloudstage/config.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &LOCAL_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join(APP_DIR).join(GLOBAL_FILE);
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Load settings from the discovered file, or defaults when there is none
pub fn load_settings() -> Result<Settings> {
    match find_config_file()? {
        Some(path) => Settings::from_file(path),
        None => {
            tracing::debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}
