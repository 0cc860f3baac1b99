//! Configuration module for the sandbox layer
//!
//! YAML configuration with serde defaults, environment overrides and
//! validation. `SandboxRunner::from_config` turns a loaded configuration
//! into a ready runner.

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::*;
pub use types::*;
pub use validation::*;


use crate::errors::ConfigError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<SandboxConfig, ConfigError> {
    ConfigLoader::from_file(path).await
}
