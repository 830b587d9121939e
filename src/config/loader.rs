// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawConfigFile, SupervisorConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** check the
/// values. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and turn it into a checked
/// [`SupervisorConfig`].
///
/// Missing keys fall back to the built-in defaults; zero durations are
/// rejected.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SupervisorConfig> {
    let raw_config = load_from_path(&path)?;
    let config = SupervisorConfig::try_from(raw_config)?;
    Ok(config)
}
