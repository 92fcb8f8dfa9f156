//! Configuration.
//!
//! Everything has a default, so an empty RON document (`()`) is a valid
//! config. Example:
//!
//! ```ron
//! (
//!     loader: (
//!         default_format: module,
//!         extensions: [".js", ".mjs"],
//!     ),
//!     watch: (poll_interval_ms: 1000),
//!     virtual_cwd: true,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::loader::{DEFAULT_BUILTINS, ModuleFormat};
use crate::watch::{DEFAULT_POLL_INTERVAL, WatchFileOptions};

/// Errors loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    pub loader: LoaderConfig,
    pub watch: WatchConfig,
    /// Keep `chdir` into a backend directory virtual instead of changing
    /// the process directory.
    pub virtual_cwd: bool,
}

impl VfsConfig {
    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        tracing::info!(path = %path.display(), "loaded vfs config");
        Ok(config)
    }
}

/// Module loader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Install the resolve/load hooks and the module stat hook. With this
    /// off, backends only serve the filesystem primitives.
    pub module_hooks: bool,
    /// Specifiers treated as host builtins (besides anything `node:`).
    pub builtins: Vec<String>,
    /// Format for files whose extension does not decide it.
    pub default_format: ModuleFormat,
    /// Extensions tried, in order, when a specifier has none.
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            module_hooks: true,
            builtins: DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect(),
            default_format: ModuleFormat::CommonJs,
            extensions: [".js", ".mjs", ".cjs", ".json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Watch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// `watch_file` poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `watch_file` options using the configured interval.
    pub fn file_options(&self) -> WatchFileOptions {
        WatchFileOptions {
            interval: self.poll_interval(),
            ..Default::default()
        }
    }
}
