//! Sandbox backends and the executor that drives them.
//!
//! A backend is the opaque isolation primitive: it offers a run-scoped
//! workspace that can receive files and run shell commands with its own
//! timeout enforcement. Two implementations ship with the crate, Docker
//! containers (`docker`) and unisolated host processes for local
//! development (`local`). The rest of the pipeline only sees the traits below.

use async_trait::async_trait;
use std::borrow::Cow;
use std::path::{Component, Path};

use crate::core_types::{RunId, Runtime};
use crate::errors::BackendError;

pub mod docker;
pub mod installer;
pub mod local;
pub mod runtime_manager;

pub use docker::{DockerProvider, DockerSettings};
pub use installer::{InstallOutput, PackageInstaller};
pub use local::LocalProvider;
pub use runtime_manager::{CommandComposer, Invocation};

/// Raw process output as reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    pub timeout_ms: u64,
}

/// One run-scoped workspace inside a backend.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Absolute path of the workspace root as seen by commands run via `exec`.
    fn workspace_root(&self) -> &str;

    /// Writes `content` to `path`, relative to the workspace root. Existing
    /// files are overwritten.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), BackendError>;

    /// Runs `command` through a shell inside the workspace. Implementations
    /// must report an exceeded timeout as `BackendError::Timeout`.
    async fn exec(&self, command: &str, options: &ExecOptions) -> Result<RawOutput, BackendError>;
}

/// Hands out sandboxes keyed by run identifier. Opening the same identifier
/// twice targets the same workspace. The runtime lets a backend pick a
/// matching toolchain (for Docker, the image).
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn open(
        &self,
        run_id: &RunId,
        runtime: Runtime,
    ) -> Result<Box<dyn Sandbox>, BackendError>;

    /// Tears down whatever `open` created for the run. The default keeps
    /// everything, which suits backends without per-run resources.
    async fn release(&self, _run_id: &RunId, _runtime: Runtime) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Rejects absolute paths and any `..` component.
pub(crate) fn check_relative_path(path: &str) -> Result<&Path, BackendError> {
    let candidate = Path::new(path);
    let valid = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if valid {
        Ok(candidate)
    } else {
        Err(BackendError::InvalidPath(path.to_string()))
    }
}

/// Joins a workspace root and a relative path with a single `/`.
pub fn workspace_path(root: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches("./")
    )
}

/// Quotes `word` for POSIX `sh`. Words made only of characters the shell
/// never interprets pass through unchanged; anything else is wrapped in
/// single quotes, with embedded quotes written as `'\''`.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@,=%".contains(c));
    if plain {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', "'\\''")))
    }
}

/// Exit code reported when the backend stops a run for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed(RawOutput),
    TimedOut(RawOutput),
    Fault(RawOutput),
}

impl ExecOutcome {
    pub fn into_output(self) -> RawOutput {
        match self {
            ExecOutcome::Completed(out) | ExecOutcome::TimedOut(out) | ExecOutcome::Fault(out) => {
                out
            }
        }
    }
}

/// Runs the composed command once and maps backend failures onto the result
/// contract. Never retries.
pub struct Executor;

impl Executor {
    pub async fn execute(sandbox: &dyn Sandbox, command: &str, timeout_ms: u64) -> ExecOutcome {
        log::debug!("Executing '{}' with timeout {}ms", command, timeout_ms);
        match sandbox.exec(command, &ExecOptions { timeout_ms }).await {
            Ok(output) => ExecOutcome::Completed(output),
            Err(err) => Self::map_error(err, timeout_ms),
        }
    }

    fn map_error(err: BackendError, timeout_ms: u64) -> ExecOutcome {
        if err.is_timeout() {
            log::warn!("Execution timed out after {}ms", timeout_ms);
            return ExecOutcome::TimedOut(RawOutput {
                stdout: String::new(),
                stderr: format!("SandboxError: execution timed out after {}ms", timeout_ms),
                exit_code: TIMEOUT_EXIT_CODE,
            });
        }

        let cause = err.cause();
        log::error!("Sandbox execution error: {} (cause: {:?})", err, cause);
        let mut stderr = format!("SandboxError: {}", err);
        if let Some(cause) = cause {
            stderr.push_str(&format!("\nCause: {}", cause));
        }
        ExecOutcome::Fault(RawOutput {
            stdout: String::new(),
            stderr,
            exit_code: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedSandbox;

    #[test]
    fn test_check_relative_path() {
        assert!(check_relative_path("main.py").is_ok());
        assert!(check_relative_path("pkg/util.py").is_ok());
        assert!(check_relative_path("./main.py").is_ok());
        assert!(check_relative_path("").is_err());
        assert!(check_relative_path("/etc/passwd").is_err());
        assert!(check_relative_path("../escape.py").is_err());
        assert!(check_relative_path("pkg/../../escape.py").is_err());
    }

    #[test]
    fn test_workspace_path_joins_cleanly() {
        assert_eq!(workspace_path("/workspace", "main.py"), "/workspace/main.py");
        assert_eq!(workspace_path("/workspace/", "./lib/a.py"), "/workspace/lib/a.py");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/workspace/main.py"), "/workspace/main.py");
        assert_eq!(shell_quote("/workspace/my app.py"), "'/workspace/my app.py'");
        assert_eq!(shell_quote("$(id)"), "'$(id)'");
        assert_eq!(shell_quote("a;b"), "'a;b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[tokio::test]
    async fn test_execute_passes_output_through() {
        let sandbox = ScriptedSandbox::new("/workspace").with_exec(Ok(RawOutput {
            stdout: "2\n".to_string(),
            stderr: "warn".to_string(),
            exit_code: 3,
        }));

        let outcome = Executor::execute(&sandbox, "python3 /workspace/main.py", 3000).await;
        assert_eq!(
            outcome,
            ExecOutcome::Completed(RawOutput {
                stdout: "2\n".to_string(),
                stderr: "warn".to_string(),
                exit_code: 3,
            })
        );
        assert_eq!(sandbox.exec_calls(), vec![("python3 /workspace/main.py".to_string(), 3000)]);
    }

    #[tokio::test]
    async fn test_execute_maps_timeout_to_124() {
        let sandbox = ScriptedSandbox::new("/workspace")
            .with_exec(Err(BackendError::Timeout { timeout_ms: 500 }));

        let outcome = Executor::execute(&sandbox, "node /workspace/main.js", 500).await;
        let out = match outcome {
            ExecOutcome::TimedOut(out) => out,
            other => panic!("expected timeout, got {:?}", other),
        };
        assert_eq!(out.exit_code, 124);
        assert!(out.stdout.is_empty());
        assert!(out.stderr.contains("timed out after 500ms"));
    }

    #[tokio::test]
    async fn test_execute_maps_fault_with_cause() {
        let sandbox = ScriptedSandbox::new("/workspace").with_exec(Err(
            BackendError::fault_with_cause("container exited unexpectedly", "oom"),
        ));

        let out = Executor::execute(&sandbox, "python3 /workspace/main.py", 3000)
            .await
            .into_output();
        assert_eq!(out.exit_code, 1);
        assert!(out.stdout.is_empty());
        assert_eq!(
            out.stderr,
            "SandboxError: container exited unexpectedly\nCause: oom"
        );
    }
}
