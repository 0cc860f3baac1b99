//! Host-process backend for local development.
//!
//! Commands run directly on the host through `sh -c` inside a per-run
//! directory. There is no isolation at all, so this backend must never face
//! untrusted input.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use which::which;

use super::{check_relative_path, ExecOptions, RawOutput, Sandbox, SandboxProvider};
use crate::config::types::RuntimesConfig;
use crate::core_types::{RunId, Runtime};
use crate::errors::BackendError;

pub struct LocalProvider {
    workspace_dir: PathBuf,
}

impl LocalProvider {
    pub fn new(workspace_dir: PathBuf) -> Self {
        log::warn!(
            "Local backend selected: code runs unisolated on this host under {}",
            workspace_dir.display()
        );
        Self { workspace_dir }
    }

    /// Logs which configured interpreters are on `PATH` and returns the
    /// runtimes that are usable.
    pub fn available_interpreters(runtimes: &RuntimesConfig) -> Vec<Runtime> {
        [Runtime::Python, Runtime::Node]
            .into_iter()
            .filter(|runtime| {
                let interpreter = &runtimes.for_runtime(*runtime).interpreter;
                match which(interpreter) {
                    Ok(path) => {
                        log::info!("{} interpreter: {}", runtime, path.display());
                        true
                    }
                    Err(_) => {
                        log::warn!("{} interpreter '{}' not found on PATH", runtime, interpreter);
                        false
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl SandboxProvider for LocalProvider {
    async fn open(
        &self,
        run_id: &RunId,
        _runtime: Runtime,
    ) -> Result<Box<dyn Sandbox>, BackendError> {
        let dir = self.workspace_dir.join(run_id.as_str());
        fs::create_dir_all(&dir).await?;
        let dir = fs::canonicalize(&dir).await?;
        let root = dir
            .to_str()
            .ok_or_else(|| BackendError::InvalidPath(dir.display().to_string()))?
            .to_string();
        Ok(Box::new(LocalSandbox { dir, root }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct LocalSandbox {
    dir: PathBuf,
    root: String,
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn workspace_root(&self) -> &str {
        &self.root
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), BackendError> {
        let target = self.dir.join(check_relative_path(path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, content).await?;
        Ok(())
    }

    async fn exec(&self, command: &str, options: &ExecOptions) -> Result<RawOutput, BackendError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::fault_with_cause("failed to spawn shell", e.to_string()))?;

        let timeout = Duration::from_millis(options.timeout_ms);
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(RawOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    // Killed by a signal: report the shell convention.
                    exit_code: output.status.code().unwrap_or(137),
                })
            }
            Err(_) => Err(BackendError::Timeout {
                timeout_ms: options.timeout_ms,
            }),
        }
    }
}
