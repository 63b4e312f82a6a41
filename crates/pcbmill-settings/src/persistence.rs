//! Settings Persistence
//!
//! Locates the user configuration file and loads it, falling back to the
//! built-in defaults when no file exists yet.

use crate::config::Config;
use crate::error::{Result, SettingsError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const APP_DIR: &str = "pcbmill";
const CONFIG_FILE: &str = "config.toml";

/// Settings persistence layer
#[derive(Debug, Clone)]
pub struct SettingsPersistence {
    config: Config,
    path: Option<PathBuf>,
}

impl Default for SettingsPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsPersistence {
    /// Create new persistence layer with default config
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            path: None,
        }
    }

    /// `<config dir>/pcbmill`
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| SettingsError::ConfigDirectory("no user config directory".into()))
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn ensure_config_dir() -> Result<PathBuf> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| SettingsError::ConfigDirectory(format!("{}: {}", dir.display(), e)))?;
        Ok(dir)
    }

    /// Load settings from file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config = Config::load_from_file(path)?;
        info!("Loaded settings from {}", path.display());
        Ok(Self {
            config,
            path: Some(path.to_path_buf()),
        })
    }

    /// Load `path`, or the default location when `None`. A missing file
    /// yields the defaults; a broken one is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_config_path() {
                Ok(p) => p,
                Err(e) => {
                    debug!("{}, using defaults", e);
                    return Ok(Self::new());
                }
            },
        };
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            debug!("No settings at {}, using defaults", path.display());
            Ok(Self {
                config: Config::default(),
                path: Some(path),
            })
        }
    }

    /// Save settings to the file they came from, or to `path`.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let target = match (path, &self.path) {
            (Some(p), _) => p.to_path_buf(),
            (None, Some(p)) => p.clone(),
            (None, None) => {
                Self::ensure_config_dir()?;
                Self::default_config_path()?
            }
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.config.save_to_file(&target)?;
        info!("Saved settings to {}", target.display());
        Ok(target)
    }

    /// Get reference to config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable reference to config
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn into_config(self) -> Config {
        self.config
    }
}
