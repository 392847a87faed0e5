//! Configuration file resolution and TOML loading
//!
//! Config file location follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`<config_dir>/<app>/config.toml`)
//! 4. System config file (`/etc/<app>/config.toml`, Linux only)
//! 5. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "V2V_CONFIG";

/// Application directory name used for config file discovery
pub const APP_DIR_NAME: &str = "v2v";

/// Where the effective configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given on the command line
    CommandLine(PathBuf),
    /// Path taken from the environment variable
    Environment(PathBuf),
    /// Discovered per-user config file
    UserFile(PathBuf),
    /// Discovered system-wide config file
    SystemFile(PathBuf),
    /// No file; built-in defaults only
    Defaults,
}

impl ConfigSource {
    /// Config file path, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserFile(p)
            | ConfigSource::SystemFile(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }

    /// True when the user named the file explicitly (missing file is an error)
    pub fn is_explicit(&self) -> bool {
        matches!(self, ConfigSource::CommandLine(_) | ConfigSource::Environment(_))
    }
}

/// Resolve which config file to use
///
/// Discovered files (priority 3 and 4) are only returned when they exist;
/// explicit paths are returned as given and validated on load.
pub fn resolve_config_source(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform config locations
    if let Some(path) = user_config_file() {
        if path.exists() {
            return ConfigSource::UserFile(path);
        }
    }

    if let Some(path) = system_config_file() {
        if path.exists() {
            return ConfigSource::SystemFile(path);
        }
    }

    // Priority 5: Built-in defaults
    ConfigSource::Defaults
}

/// Per-user config file path for the platform
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// System-wide config file path (Linux only)
fn system_config_file() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        Some(PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml"))
    } else {
        None
    }
}

/// Load a TOML config of type `T` from the resolved source
///
/// `ConfigSource::Defaults` yields `T::default()`. Missing keys fall back to
/// the type's serde defaults.
pub fn load_toml<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = source.path() else {
        debug!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config = toml::from_str(&content).map_err(|source| Error::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}
