//! # Config Core
//!
//! This crate provides configuration loading and management for the AMP Game Engine.
//! Configuration types implement `Config` and are deserialized from RON files
//! found via hierarchical directory search.

use amp_core::{ConfigError, Error, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Trait for configuration types that can be loaded from RON files.
///
/// This trait defines the interface for configuration objects that can be
/// deserialized from RON format and provides metadata about their storage.
pub trait Config: DeserializeOwned + Send + Sync + 'static {
    /// The filename (without path) where this configuration should be stored.
    const FILE_NAME: &'static str;

    /// Returns the default path for this configuration file.
    ///
    /// By default, this returns just the filename, but implementations can
    /// override this to provide custom path logic.
    fn default_path() -> PathBuf {
        PathBuf::from(Self::FILE_NAME)
    }
}

/// Configuration loader that handles file discovery and caching.
///
/// The loader searches for configuration files in a hierarchical manner:
/// 1. Current working directory
/// 2. $XDG_CONFIG_HOME/amp (or ~/.config/amp on Unix)
pub struct ConfigLoader {
    /// Search paths for configuration files
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader with default search paths.
    pub fn new() -> Self {
        let mut search_paths = vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))];

        // Add XDG_CONFIG_HOME/amp or ~/.config/amp
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("amp"));
        }

        // Remove duplicate paths to avoid redundant IO
        search_paths.dedup();

        Self { search_paths }
    }

    /// Load a configuration of type T from the filesystem.
    ///
    /// This searches through the configured search paths in order,
    /// attempting to load and deserialize the configuration file.
    pub fn load<T: Config>(&self) -> Result<T> {
        for dir in &self.search_paths {
            let path = dir.join(T::default_path());
            if !path.exists() {
                continue;
            }

            let data =
                std::fs::read_to_string(&path).map_err(|e| Error::from(ConfigError::IoError(e)))?;

            let cfg = ron::from_str(&data)
                .map_err(|e| Error::from(ConfigError::parse_error(e.to_string())))?;

            return Ok(cfg);
        }
        Err(Error::from(ConfigError::file_not_found(
            T::default_path().display().to_string(),
        )))
    }

}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
