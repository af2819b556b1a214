//! # Persistence
//!
//! Remembers small values across process restarts, currently only the
//! name of the last selected script. Values live in one toml table at
//! `<config_dir>/simscript/state.toml`.
//!
//! ## Error Handling
//! Nothing here is fatal: read and write failures are logged and `recall`
//! falls back to `None`, so a read-only or missing config directory only
//! costs the memory of the last session.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STATE_FILE: &str = "state.toml";

/// Key under which the scheduler stores the selected script
pub const SCRIPT_KEY: &str = "script";

/// Key/value memory consulted at startup and on script switch
pub trait Persistence {
    fn remember(&mut self, key: &str, value: &str);
    fn recall(&self, key: &str) -> Option<String>;
}

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// State file in the per-user config directory
    pub fn in_config_dir() -> Option<Self> {
        crate::config::app_config_dir().map(|dir| Self::new(dir.join(STATE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| eyre!("Failed to read state file {}: {}", self.path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse state file {}: {}", self.path.display(), e))
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
        }
        let content = toml::to_string_pretty(values)
            .map_err(|e| eyre!("Failed to serialize state: {}", e))?;
        fs::write(&self.path, content)
            .map_err(|e| eyre!("Failed to write state file {}: {}", self.path.display(), e))
    }
}

impl Persistence for StateFile {
    fn remember(&mut self, key: &str, value: &str) {
        let mut values = self.read().unwrap_or_else(|e| {
            warn!("{}", e);
            BTreeMap::new()
        });
        values.insert(key.to_string(), value.to_string());
        match self.write(&values) {
            Ok(()) => debug!("Remembered {} = {}", key, value),
            Err(e) => warn!("{}", e),
        }
    }

    fn recall(&self, key: &str) -> Option<String> {
        match self.read() {
            Ok(mut values) => values.remove(key),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }
}

/// Keeps values for the process lifetime only
#[derive(Debug, Default)]
pub struct MemoryState {
    values: BTreeMap<String, String>,
}

impl Persistence for MemoryState {
    fn remember(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn recall(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
