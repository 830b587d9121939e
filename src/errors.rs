// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

pub use crate::process::SupervisorError;

#[derive(Error, Debug)]
pub enum RuntestError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

pub type Result<T> = std::result::Result<T, RuntestError>;
