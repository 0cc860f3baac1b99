//! Configuration type definitions for the sandbox layer
//!
//! Every section has serde defaults, so an empty YAML document is a valid
//! development configuration that targets the Docker backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::core_types::Runtime;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub runtimes: RuntimesConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid(format!("unknown environment '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Docker,
    Local,
    Simulation,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(BackendKind::Docker),
            "local" => Ok(BackendKind::Local),
            "simulation" | "preview" => Ok(BackendKind::Simulation),
            other => Err(ConfigError::Invalid(format!("unknown backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Host directory under which per-run workspaces are created.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default)]
    pub docker: DockerConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            workspace_dir: default_workspace_dir(),
            docker: DockerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default = "default_python_image")]
    pub python_image: String,
    #[serde(default = "default_node_image")]
    pub node_image: String,
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default = "default_network_mode")]
    pub network_mode: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            python_image: default_python_image(),
            node_image: default_node_image(),
            memory_mb: None,
            network_mode: default_network_mode(),
        }
    }
}

/// Interpreter and install command for one runtime. `{root}` in the install
/// command is replaced with the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub interpreter: String,
    pub install_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimesConfig {
    #[serde(default = "default_python_runtime")]
    pub python: RuntimeSettings,
    #[serde(default = "default_node_runtime")]
    pub node: RuntimeSettings,
}

impl RuntimesConfig {
    pub fn for_runtime(&self, runtime: Runtime) -> &RuntimeSettings {
        match runtime {
            Runtime::Python => &self.python,
            Runtime::Node => &self.node,
        }
    }
}

impl Default for RuntimesConfig {
    fn default() -> Self {
        Self {
            python: default_python_runtime(),
            node: default_node_runtime(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Guard every run, denying all hosts when no allow-list is given.
    #[serde(default)]
    pub deny_without_allow_list: bool,
}

/// Limits and endpoint for resolving GitHub repositories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir().join("docle")
}

fn default_python_image() -> String {
    "python:3.12-slim".to_string()
}

fn default_node_image() -> String {
    "node:20-slim".to_string()
}

fn default_network_mode() -> String {
    "bridge".to_string()
}

fn default_python_runtime() -> RuntimeSettings {
    RuntimeSettings {
        interpreter: "python3".to_string(),
        install_command: "pip3 install -r {root}/requirements.txt --quiet".to_string(),
    }
}

fn default_node_runtime() -> RuntimeSettings {
    RuntimeSettings {
        interpreter: "node".to_string(),
        install_command: "npm install --silent".to_string(),
    }
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_max_files() -> usize {
    100
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    [
        ".py", ".js", ".ts", ".json", ".txt", ".md", ".jsx", ".tsx", ".mjs", ".cjs", ".yml",
        ".yaml", ".toml", ".ini", ".cfg", ".conf",
    ]
    .iter()
    .map(|ext| ext.to_string())
    .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}
