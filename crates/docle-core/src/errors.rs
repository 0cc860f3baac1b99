//! Error types for the sandbox orchestration layer
//!
//! Failures of the *submitted code* (non-zero exits, timeouts, denied network
//! calls, failed installs) never surface through these types: the runner folds
//! them into a well-formed `ExecutionResult`. The enums here describe the
//! remaining cases, where the backend itself is unusable or the host is
//! misconfigured, and those propagate to the caller.

use thiserror::Error;

/// Errors raised by a sandbox backend while writing files or running commands.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("{message}")]
    Fault {
        message: String,
        cause: Option<String>,
    },
    #[error("invalid workspace path '{0}'")]
    InvalidPath(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

impl BackendError {
    pub fn fault(message: impl Into<String>) -> Self {
        BackendError::Fault {
            message: message.into(),
            cause: None,
        }
    }

    pub fn fault_with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        BackendError::Fault {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout { .. })
    }

    /// Nested cause, when the backend reported one.
    pub fn cause(&self) -> Option<String> {
        match self {
            BackendError::Fault { cause, .. } => cause.clone(),
            BackendError::Io(err) => std::error::Error::source(err).map(|s| s.to_string()),
            BackendError::Docker(err) => std::error::Error::source(err).map(|s| s.to_string()),
            _ => None,
        }
    }
}

/// Errors raised while materializing a submission into a workspace.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("No code or files provided")]
    NoSourceProvided,
    #[error("failed to stage '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: BackendError,
    },
}

/// Errors that escape `SandboxRunner::run`. These indicate the backend is
/// unusable, not that the submitted program failed.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to open sandbox for run '{run_id}': {source}")]
    Open {
        run_id: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to write '{path}' into the workspace: {source}")]
    Workspace {
        path: String,
        #[source]
        source: BackendError,
    },
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("backend initialization failed: {0}")]
    Backend(String),
}

/// Rejection of a caller-supplied run identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid run identifier '{value}': {reason}")]
pub struct RunIdError {
    pub value: String,
    pub reason: &'static str,
}
