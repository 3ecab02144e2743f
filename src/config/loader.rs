// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "JOBPIPE_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** parse durations
/// or regexes. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls and per-tool
///   fallbacks).
/// - Parses duration strings and progress regexes, rejecting zero sizes.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Resolve and load the effective configuration.
///
/// An explicit path must exist. Without one, `JOBPIPE_CONFIG` is consulted,
/// then `Jobpipe.toml` in the working directory; if that default file does
/// not exist the built-in defaults are used.
pub fn load_effective(explicit: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = explicit {
        return load_and_validate(path);
    }

    if let Ok(from_env) = std::env::var(CONFIG_ENV_VAR) {
        if !from_env.trim().is_empty() {
            return load_and_validate(from_env.trim());
        }
    }

    let path = default_config_path();
    if path.is_file() {
        load_and_validate(&path)
    } else {
        debug!(path = ?path, "no config file found; using built-in defaults");
        ConfigFile::defaults()
    }
}

/// `Jobpipe.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Jobpipe.toml")
}
