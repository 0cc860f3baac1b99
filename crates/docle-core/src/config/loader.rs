//! Configuration loader for YAML files and environment overrides
//!
//! Values come from the YAML document first. `DOCLE_BACKEND`,
//! `DOCLE_WORKSPACE_DIR` and `DOCLE_ENVIRONMENT` then override the matching
//! fields, and the result is validated before it is handed out.

use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::types::*;
use crate::errors::ConfigError;

pub const ENV_BACKEND: &str = "DOCLE_BACKEND";
pub const ENV_WORKSPACE_DIR: &str = "DOCLE_WORKSPACE_DIR";
pub const ENV_ENVIRONMENT: &str = "DOCLE_ENVIRONMENT";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// `~/.docle/docle.yaml`, when a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".docle").join("docle.yaml"))
    }

    /// Loads `path` when it exists, otherwise falls back to the defaults.
    /// Environment overrides and validation apply in both cases.
    pub async fn from_source<P: AsRef<Path>>(path: P) -> Result<SandboxConfig, ConfigError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            return Self::from_file(path).await;
        }

        log::debug!(
            "No config file at {}, using built-in defaults",
            path.display()
        );
        Self::finish(SandboxConfig::default())
    }

    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<SandboxConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<SandboxConfig, ConfigError> {
        let config: SandboxConfig = if content.trim().is_empty() {
            SandboxConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        Self::finish(config)
    }

    fn finish(mut config: SandboxConfig) -> Result<SandboxConfig, ConfigError> {
        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn resolve_environment(config: &mut SandboxConfig) -> Result<(), ConfigError> {
        if let Ok(value) = env::var(ENV_BACKEND) {
            config.backend.kind = value.parse()?;
            log::debug!("{} overrides backend to {:?}", ENV_BACKEND, config.backend.kind);
        }

        if let Ok(value) = env::var(ENV_WORKSPACE_DIR) {
            if !value.trim().is_empty() {
                config.backend.workspace_dir = PathBuf::from(value);
            }
        }

        if let Ok(value) = env::var(ENV_ENVIRONMENT) {
            config.environment = value.parse()?;
        }

        Ok(())
    }
}
