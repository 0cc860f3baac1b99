//! Core type definitions shared by every stage of a run
//!
//! These types form the contract between the surrounding service and the
//! orchestration layer: what a caller may submit (`RunRequest`) and what it is
//! guaranteed to receive back (`ExecutionResult`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RunIdError;
use crate::policy::PolicyInput;

/// Language runtime a submission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Python,
    Node,
}

impl Runtime {
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::Python => "python",
            Runtime::Node => "node",
        }
    }

    /// File staged for inline code, and the entrypoint used when a file tree
    /// does not name one.
    pub fn default_entrypoint(self) -> &'static str {
        match self {
            Runtime::Python => "main.py",
            Runtime::Node => "main.js",
        }
    }

    pub fn source_extension(self) -> &'static str {
        match self {
            Runtime::Python => "py",
            Runtime::Node => "js",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" => Ok(Runtime::Python),
            "node" | "nodejs" | "javascript" | "js" => Ok(Runtime::Node),
            other => Err(format!(
                "unsupported runtime '{}' (expected python or node)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The source form that drives staging. Exactly one form is used per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSpecification {
    Inline {
        code: String,
    },
    Files {
        files: Vec<FileEntry>,
        entrypoint: Option<String>,
    },
}

impl RunSpecification {
    pub fn inline(code: impl Into<String>) -> Self {
        RunSpecification::Inline { code: code.into() }
    }

    pub fn files(files: Vec<FileEntry>, entrypoint: Option<String>) -> Self {
        RunSpecification::Files { files, entrypoint }
    }

    /// Builds a specification from the loose request fields. A non-empty file
    /// list takes precedence over inline code. Missing sources produce an
    /// empty inline spec, which the stager rejects.
    pub fn from_parts(
        code: Option<String>,
        files: Option<Vec<FileEntry>>,
        entrypoint: Option<String>,
    ) -> Self {
        match files {
            Some(files) if !files.is_empty() => RunSpecification::Files { files, entrypoint },
            _ => RunSpecification::Inline {
                code: code.unwrap_or_default(),
            },
        }
    }

    pub fn file_count(&self) -> Option<usize> {
        match self {
            RunSpecification::Inline { .. } => None,
            RunSpecification::Files { files, .. } => Some(files.len()),
        }
    }
}

/// Ordered list of package specifiers, passed verbatim to the package manager.
pub type PackageSet = Vec<String>;

/// Caller-supplied key naming the workspace a run targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

const MAX_RUN_ID_LEN: usize = 128;

impl RunId {
    pub fn new(value: impl Into<String>) -> Result<Self, RunIdError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value.len() > MAX_RUN_ID_LEN {
            Some("must be at most 128 characters")
        } else if value == "." || value == ".." {
            Some("must not be a relative directory name")
        } else if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            Some("may only contain ASCII letters, digits, '-', '_' and '.'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RunIdError { value, reason }),
            None => Ok(Self(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = RunIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RunId::new(value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// A validated request handed to the runner by the surrounding service.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub runtime: Runtime,
    pub spec: RunSpecification,
    pub packages: PackageSet,
    pub policy: PolicyInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_mb: Option<u64>,
}

impl Usage {
    pub fn with_duration(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..Default::default()
        }
    }
}

/// Result contract returned for every run, whether it succeeded, failed, or
/// was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub usage: Usage,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Terminal state a run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    TimedOut,
    InstallFailed,
    ExecutorError,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub result: ExecutionResult,
}

impl RunReport {
    pub fn into_result(self) -> ExecutionResult {
        self.result
    }
}
