//! Runtime settings loaded from `config.toml`
//!
//! Missing files fall back to defaults so a fresh install runs without any
//! configuration; command-line options override whatever was loaded.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const APP_DIR: &str = "simscript";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Tick rate must be at least 1 Hz, got {0}")]
    InvalidHertz(u32),
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Target scheduler frequency
    pub hertz: u32,
    /// Directory holding the selectable `*.rhai` scripts
    pub scripts_dir: PathBuf,
    /// Directory holding `*.rhai` modules synced every tick
    pub modules_dir: PathBuf,
    /// Name under which virtual joysticks appear among physical devices
    pub virtual_device_name: String,
    pub vjoy_library: PathBuf,
    /// Where the session log file goes; the system temp dir when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hertz: 30,
            scripts_dir: PathBuf::from("scripts"),
            modules_dir: PathBuf::from("modules"),
            virtual_device_name: crate::devices::VIRTUAL_DEVICE_NAME.to_string(),
            vjoy_library: ["contrib", "vjoy", "vJoyInterface.dll"].iter().collect(),
            log_dir: None,
        }
    }
}

impl Settings {
    /// Loads `path`, or the per-user config file when `path` is None
    ///
    /// An explicitly given file must exist; the per-user file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        settings.validate()?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hertz == 0 {
            return Err(ConfigError::InvalidHertz(self.hertz));
        }
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Per-user directory for settings and remembered state
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

fn default_config_path() -> Option<PathBuf> {
    app_config_dir().map(|dir| dir.join(CONFIG_FILE))
}
