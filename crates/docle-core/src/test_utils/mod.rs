// src/test_utils/mod.rs
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::core_types::{RunId, Runtime};
use crate::errors::BackendError;
use crate::executors::{ExecOptions, RawOutput, Sandbox, SandboxProvider};

pub mod mock_github_server;

#[derive(Default)]
struct ScriptState {
    files: BTreeMap<String, String>,
    write_order: Vec<String>,
    exec_calls: Vec<(String, u64)>,
    responses: VecDeque<Result<RawOutput, BackendError>>,
    fail_writes: bool,
}

/// In-memory sandbox that records writes and replays scripted exec results.
/// Clones share state, so a test can keep a handle while the runner owns a box.
#[derive(Clone)]
pub struct ScriptedSandbox {
    root: String,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSandbox {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    /// Queues the result of the next unanswered `exec` call. Once the queue is
    /// drained, `exec` succeeds with empty output.
    pub fn with_exec(self, response: Result<RawOutput, BackendError>) -> Self {
        self.state.lock().unwrap().responses.push_back(response);
        self
    }

    pub fn with_exit(self, stdout: &str, stderr: &str, exit_code: i32) -> Self {
        self.with_exec(Ok(RawOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }))
    }

    pub fn failing_writes(self) -> Self {
        self.state.lock().unwrap().fail_writes = true;
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn written_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().write_order.clone()
    }

    pub fn exec_calls(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().exec_calls.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.exec_calls().into_iter().map(|(cmd, _)| cmd).collect()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    fn workspace_root(&self) -> &str {
        &self.root
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only workspace",
            )));
        }
        state.files.insert(path.to_string(), content.to_string());
        state.write_order.push(path.to_string());
        Ok(())
    }

    async fn exec(&self, command: &str, options: &ExecOptions) -> Result<RawOutput, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.exec_calls.push((command.to_string(), options.timeout_ms));
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(RawOutput::default()))
    }
}

/// Provider that always hands out the same scripted sandbox.
pub struct ScriptedProvider {
    sandbox: ScriptedSandbox,
    opened: Mutex<Vec<String>>,
    fail_open: bool,
}

impl ScriptedProvider {
    pub fn new(sandbox: ScriptedSandbox) -> Self {
        Self {
            sandbox,
            opened: Mutex::new(Vec::new()),
            fail_open: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            sandbox: ScriptedSandbox::new("/workspace"),
            opened: Mutex::new(Vec::new()),
            fail_open: true,
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxProvider for ScriptedProvider {
    async fn open(
        &self,
        run_id: &RunId,
        _runtime: Runtime,
    ) -> Result<Box<dyn Sandbox>, BackendError> {
        if self.fail_open {
            return Err(BackendError::fault("backend unavailable"));
        }
        self.opened.lock().unwrap().push(run_id.to_string());
        Ok(Box::new(self.sandbox.clone()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
