//! Configuration for the download lifecycle core

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

// Resolved once at startup; hosts read it through default_download_dir()
static DEFAULT_DIR: Lazy<PathBuf> = Lazy::new(platform_download_dir);

#[cfg(all(target_family = "unix", not(target_os = "macos")))]
fn platform_download_dir() -> PathBuf {
    if let Ok(dir) = env::var("XDG_DOWNLOAD_DIR") {
        return PathBuf::from(dir);
    }
    env::var("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(target_os = "macos")]
fn platform_download_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(target_family = "windows")]
fn platform_download_dir() -> PathBuf {
    env::var("USERPROFILE")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// The platform download directory, or a fallback under the user's home
pub fn default_download_dir() -> PathBuf {
    DEFAULT_DIR.clone()
}

/// Download lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Directory offered as the save-dialog starting point
    #[serde(default = "default_download_dir")]
    pub default_dir: PathBuf,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            default_dir: default_download_dir(),
        }
    }
}

impl DownloadsConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default save directory
    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = dir.into();
        self
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - WEBSAVE_DOWNLOAD_DIR: default save directory
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("WEBSAVE_DOWNLOAD_DIR") {
            config.default_dir = PathBuf::from(dir);
        }

        config
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize configuration to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
