//! Debug server settings persistence.
//!
//! Host and port are stored as raw strings so whatever the user typed is
//! representable; validation happens in the lifecycle state machine, not
//! here. A missing or corrupt settings file silently falls back to defaults.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: &str = "8080";

/// User-editable debug server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub host: String,
    pub port: String,
    /// Log full snapshot payloads instead of one-line summaries.
    pub detailed_output: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            detailed_output: false,
        }
    }
}

impl DebugSettings {
    /// Settings file under the platform config directory.
    pub fn settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hindsight")
            .join("settings.toml")
    }

    /// Load from disk, returning defaults if the file is missing or corrupt.
    pub fn load() -> Self {
        Self::load_from(&Self::settings_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save to disk, creating parent directories as needed.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
