// src/config/mod.rs

//! Supervision settings: defaults, the optional TOML file, validation.

pub mod loader;
pub mod model;
mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ExitNotification, RawConfigFile, SupervisorConfig, SupervisorSection, DEFAULT_GRACE, DEFAULT_TIMEOUT};
