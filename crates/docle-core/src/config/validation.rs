//! Semantic checks applied after a configuration is parsed.

use crate::config::types::{BackendKind, Environment, SandboxConfig};
use crate::errors::ConfigError;

/// Smallest container memory limit accepted, in MiB.
pub const MIN_MEMORY_MB: u64 = 16;

impl SandboxConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.kind == BackendKind::Simulation
            && self.environment == Environment::Production
        {
            return Err(ConfigError::Invalid(
                "the simulation backend cannot be used in production".to_string(),
            ));
        }

        for (name, runtime) in [("python", &self.runtimes.python), ("node", &self.runtimes.node)] {
            if runtime.interpreter.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{} interpreter cannot be empty",
                    name
                )));
            }
            if runtime.install_command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{} install_command cannot be empty",
                    name
                )));
            }
        }

        // pip is not run from the workspace, so it needs the manifest's full path.
        if !self.runtimes.python.install_command.contains("{root}") {
            return Err(ConfigError::Invalid(
                "python install_command must reference {root}".to_string(),
            ));
        }

        if self.backend.kind == BackendKind::Docker {
            let docker = &self.backend.docker;
            if docker.python_image.trim().is_empty() || docker.node_image.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "Docker image names cannot be empty".to_string(),
                ));
            }
            if docker.network_mode.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "Docker network_mode cannot be empty".to_string(),
                ));
            }
            if let Some(memory) = docker.memory_mb {
                if memory < MIN_MEMORY_MB {
                    return Err(ConfigError::Invalid(format!(
                        "Docker memory_mb must be at least {} (got {})",
                        MIN_MEMORY_MB, memory
                    )));
                }
            }
        }

        if self.repo.max_files == 0 {
            return Err(ConfigError::Invalid(
                "repo max_files must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
