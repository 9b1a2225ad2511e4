//! Configuration file resolution and loading
//!
//! The config file is located in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `LAVASTREAM_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/lavastream/config.toml`)
//!
//! A missing file is not an error; players simply run with defaults.

use crate::params::GlobalParams;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LAVASTREAM_CONFIG";

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    CommandLine,
    Environment,
    PlatformDefault,
}

/// Resolve the config file path without touching the filesystem
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigOrigin)> {
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), ConfigOrigin::CommandLine));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), ConfigOrigin::Environment));
        }
    }

    default_config_path().map(|p| (p, ConfigOrigin::PlatformDefault))
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lavastream").join("config.toml"))
}

/// Load the resolved config file into `params`
///
/// Returns the path that was loaded, or `None` when no file exists at the
/// platform default. An explicitly named file that is missing is an error.
pub fn load_config(cli_arg: Option<&Path>, params: &GlobalParams) -> Result<Option<PathBuf>> {
    let Some((path, origin)) = resolve_config_path(cli_arg) else {
        warn!("Could not determine config directory, using defaults");
        return Ok(None);
    };

    if !path.exists() {
        if origin == ConfigOrigin::PlatformDefault {
            info!("No config file at {}, using defaults", path.display());
            return Ok(None);
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    params.init_from_toml(&content)?;
    info!("Loaded config from {} ({:?})", path.display(), origin);
    Ok(Some(path))
}
