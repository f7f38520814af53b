//! Configuration file support.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Instances kept per converter key.
    pub pool_size: Option<usize>,
    /// Directory for intermediate stage files.
    pub steps_dir: Option<PathBuf>,
    /// Persist every stage's output by default.
    pub save_intermediary_steps: bool,
    /// Pretty-print structured output by default.
    pub pretty_print: bool,
    /// Enable verbose output by default.
    pub verbose: bool,
}

impl Config {
    /// Load config from the default location (~/.config/formchain/config.toml).
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Load config from a specific path.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one
    /// yields the defaults with a warning.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::read(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}", e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("formchain").join("config.toml"))
    }
}
