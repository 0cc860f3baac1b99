//! Run orchestration
//!
//! `SandboxRunner` drives one request through the whole pipeline:
//!
//! ```text
//! Received -> Staged -> (Installing ->) (GuardInjected ->) Executing
//!          -> Completed | TimedOut | InstallFailed | ExecutorError
//! ```
//!
//! Every failure of the submitted program ends in a well-formed
//! `ExecutionResult`. Only an unusable backend (it cannot be opened or
//! written to) surfaces as `RunnerError`. Runs that share a run identifier
//! are serialized through `WorkspaceLocks`; each run is otherwise a single
//! sequential pipeline.

use std::sync::Arc;
use std::time::Instant;

use crate::config::types::{BackendKind, RuntimesConfig, SandboxConfig};
use crate::core_types::{
    ExecutionResult, RunId, RunOutcome, RunReport, RunRequest, Runtime, Usage,
};
use crate::errors::{BackendError, ConfigError, RunnerError, StageError};
use crate::executors::installer::INSTALL_FAILURE_MARKER;
use crate::executors::{
    CommandComposer, DockerProvider, DockerSettings, ExecOutcome, Executor, LocalProvider,
    PackageInstaller, Sandbox, SandboxProvider, TIMEOUT_EXIT_CODE,
};
use crate::guard::NetworkGuardSynthesizer;
use crate::output::OutputLimiter;
use crate::policy::{normalize, ExecutionPolicy};
use crate::simulation::simulate;
use crate::workspace::{WorkspaceLocks, WorkspaceStager};

enum Backend {
    Live(Arc<dyn SandboxProvider>),
    Simulated,
}

pub struct SandboxRunner {
    backend: Backend,
    composer: CommandComposer,
    synthesizer: NetworkGuardSynthesizer,
    locks: WorkspaceLocks,
}

impl SandboxRunner {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        runtimes: RuntimesConfig,
        synthesizer: NetworkGuardSynthesizer,
    ) -> Self {
        Self {
            backend: Backend::Live(provider),
            composer: CommandComposer::new(runtimes),
            synthesizer,
            locks: WorkspaceLocks::new(),
        }
    }

    /// Runner without a backend. Every run returns a preview instead of
    /// executing anything.
    pub fn simulated() -> Self {
        Self {
            backend: Backend::Simulated,
            composer: CommandComposer::default(),
            synthesizer: NetworkGuardSynthesizer::default(),
            locks: WorkspaceLocks::new(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let synthesizer = NetworkGuardSynthesizer::new(config.network.deny_without_allow_list);
        let runtimes = config.runtimes.clone();
        let workspace_dir = config.backend.workspace_dir.clone();

        let provider: Arc<dyn SandboxProvider> = match config.backend.kind {
            BackendKind::Simulation => {
                log::warn!("No execution backend configured; runs will be simulated");
                return Ok(Self::simulated());
            }
            BackendKind::Local => {
                if LocalProvider::available_interpreters(&runtimes).is_empty() {
                    log::warn!("No configured interpreter is available; every run will fail");
                }
                Arc::new(LocalProvider::new(workspace_dir))
            }
            BackendKind::Docker => {
                let docker = &config.backend.docker;
                let settings = DockerSettings {
                    python_image: docker.python_image.clone(),
                    node_image: docker.node_image.clone(),
                    memory_mb: docker.memory_mb,
                    network_mode: docker.network_mode.clone(),
                    workspace_dir,
                };
                Arc::new(
                    DockerProvider::connect(settings)
                        .map_err(|e| ConfigError::Backend(e.to_string()))?,
                )
            }
        };

        Ok(Self::new(provider, runtimes, synthesizer))
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.backend, Backend::Simulated)
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Live(provider) => provider.name(),
            Backend::Simulated => "simulation",
        }
    }

    /// Releases backend resources held for `run_id`.
    pub async fn release(&self, run_id: &RunId, runtime: Runtime) -> Result<(), BackendError> {
        match &self.backend {
            Backend::Live(provider) => provider.release(run_id, runtime).await,
            Backend::Simulated => Ok(()),
        }
    }

    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, RunnerError> {
        let start = Instant::now();
        let run_id = &request.run_id;
        log::debug!("run {}: Received ({} {})", run_id, request.runtime, self.backend_name());

        let provider = match &self.backend {
            Backend::Live(provider) => provider,
            Backend::Simulated => {
                let result = simulate(
                    request.runtime,
                    &request.spec,
                    &request.packages,
                    &request.policy,
                );
                let outcome = if result.exit_code == TIMEOUT_EXIT_CODE {
                    RunOutcome::TimedOut
                } else {
                    RunOutcome::Completed
                };
                log::debug!("run {}: simulated -> {:?}", run_id, outcome);
                return Ok(RunReport { outcome, result });
            }
        };

        let policy = normalize(&request.policy);
        let _lease = self.locks.acquire(run_id).await;

        let sandbox = provider
            .open(run_id, request.runtime)
            .await
            .map_err(|source| RunnerError::Open {
                run_id: run_id.to_string(),
                source,
            })?;

        let report = self
            .run_in(sandbox.as_ref(), request, &policy, start)
            .await?;
        log::debug!(
            "run {}: {:?} (exit {}, {}ms)",
            run_id,
            report.outcome,
            report.result.exit_code,
            report.result.usage.duration_ms
        );
        Ok(report)
    }

    async fn run_in(
        &self,
        sandbox: &dyn Sandbox,
        request: &RunRequest,
        policy: &ExecutionPolicy,
        start: Instant,
    ) -> Result<RunReport, RunnerError> {
        let run_id = &request.run_id;
        let runtime = request.runtime;

        let staged = match WorkspaceStager::stage(sandbox, runtime, &request.spec).await {
            Ok(staged) => staged,
            Err(StageError::NoSourceProvided) => {
                log::debug!("run {}: Received -> Rejected", run_id);
                return Ok(Self::report(
                    RunOutcome::Rejected,
                    String::new(),
                    format!("SandboxError: {}", StageError::NoSourceProvided),
                    1,
                    policy,
                    start,
                ));
            }
            Err(StageError::Write { path, source }) => {
                return Err(RunnerError::Workspace { path, source });
            }
        };
        log::debug!("run {}: Received -> Staged ({})", run_id, staged.entrypoint);

        if !request.packages.is_empty() {
            log::debug!("run {}: Staged -> Installing", run_id);
            let installer = PackageInstaller::new(self.composer.runtimes());
            let install = installer
                .install(sandbox, runtime, &request.packages, policy.timeout_ms)
                .await
                .map_err(|source| RunnerError::Workspace {
                    path: PackageInstaller::manifest_name(runtime).to_string(),
                    source,
                })?;

            if install.exit_code != 0 {
                log::debug!("run {}: Installing -> InstallFailed", run_id);
                return Ok(Self::report(
                    RunOutcome::InstallFailed,
                    install.stdout,
                    format!("{}{}", INSTALL_FAILURE_MARKER, install.stderr),
                    install.exit_code,
                    policy,
                    start,
                ));
            }
        }

        let guard = self.synthesizer.synthesize(runtime, policy);
        if let Some(module) = &guard {
            Self::write(sandbox, &module.file_name, &module.source).await?;
            log::debug!("run {}: GuardInjected ({})", run_id, module.file_name);
        }

        let invocation = self.composer.compose(runtime, &staged, guard.as_ref());
        for (path, content) in &invocation.support_files {
            Self::write(sandbox, path, content).await?;
        }

        log::debug!("run {}: Executing", run_id);
        let outcome = Executor::execute(sandbox, &invocation.command, policy.timeout_ms).await;
        let state = match &outcome {
            ExecOutcome::Completed(_) => RunOutcome::Completed,
            ExecOutcome::TimedOut(_) => RunOutcome::TimedOut,
            ExecOutcome::Fault(_) => RunOutcome::ExecutorError,
        };
        let output = outcome.into_output();

        Ok(Self::report(
            state,
            output.stdout,
            output.stderr,
            output.exit_code,
            policy,
            start,
        ))
    }

    async fn write(sandbox: &dyn Sandbox, path: &str, content: &str) -> Result<(), RunnerError> {
        sandbox
            .write_file(path, content)
            .await
            .map_err(|source| RunnerError::Workspace {
                path: path.to_string(),
                source,
            })
    }

    fn report(
        outcome: RunOutcome,
        stdout: String,
        stderr: String,
        exit_code: i32,
        policy: &ExecutionPolicy,
        start: Instant,
    ) -> RunReport {
        let limited = OutputLimiter::limit(stdout, stderr, policy.max_output_bytes);
        RunReport {
            outcome,
            result: ExecutionResult {
                stdout: limited.stdout,
                stderr: limited.stderr,
                exit_code,
                usage: Usage::with_duration(start.elapsed().as_millis() as u64),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{FileEntry, RunSpecification};
    use crate::policy::PolicyInput;
    use crate::test_utils::{ScriptedProvider, ScriptedSandbox};

    fn request(runtime: Runtime, spec: RunSpecification) -> RunRequest {
        RunRequest {
            run_id: RunId::new("run-1").unwrap(),
            runtime,
            spec,
            packages: Vec::new(),
            policy: PolicyInput::default(),
        }
    }

    fn runner(sandbox: &ScriptedSandbox) -> SandboxRunner {
        SandboxRunner::new(
            Arc::new(ScriptedProvider::new(sandbox.clone())),
            RuntimesConfig::default(),
            NetworkGuardSynthesizer::default(),
        )
    }

    #[tokio::test]
    async fn test_inline_python_completes() {
        let sandbox = ScriptedSandbox::new("/workspace").with_exit("2\n", "", 0);
        let report = runner(&sandbox)
            .run(&request(Runtime::Python, RunSpecification::inline("print(1+1)")))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.result.exit_code, 0);
        assert!(report.result.stdout.contains('2'));
        assert_eq!(sandbox.file("main.py").as_deref(), Some("print(1+1)"));
        assert_eq!(
            sandbox.exec_calls(),
            vec![("python3 /workspace/main.py".to_string(), 3000)]
        );
    }

    #[tokio::test]
    async fn test_multi_file_defaults_to_main() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let spec = RunSpecification::files(
            vec![
                FileEntry::new("main.py", "from util import f\nf()"),
                FileEntry::new("util.py", "def f():\n    print('ok')"),
            ],
            None,
        );
        runner(&sandbox).run(&request(Runtime::Python, spec)).await.unwrap();

        assert_eq!(sandbox.commands(), vec!["python3 /workspace/main.py"]);
        assert!(sandbox.file("util.py").is_some());
    }

    #[tokio::test]
    async fn test_install_failure_skips_entrypoint() {
        let sandbox = ScriptedSandbox::new("/workspace").with_exit(
            "Collecting nope",
            "ERROR: No matching distribution found for nope",
            1,
        );
        let mut req = request(Runtime::Python, RunSpecification::inline("print('never')"));
        req.packages = vec!["nope".to_string()];

        let report = runner(&sandbox).run(&req).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::InstallFailed);
        assert_eq!(report.result.exit_code, 1);
        assert_eq!(report.result.stdout, "Collecting nope");
        assert!(report
            .result
            .stderr
            .starts_with("Package installation failed:\nERROR: No matching distribution"));
        assert_eq!(sandbox.commands().len(), 1);
        assert!(!report.result.stdout.contains("never"));
    }

    #[tokio::test]
    async fn test_install_then_run() {
        let sandbox = ScriptedSandbox::new("/workspace")
            .with_exit("", "", 0)
            .with_exit("done\n", "", 0);
        let mut req = request(Runtime::Node, RunSpecification::inline("console.log('done')"));
        req.packages = vec!["lodash@4.17.21".to_string()];
        req.policy.timeout_ms = Some(90_000);

        let report = runner(&sandbox).run(&req).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(
            sandbox.exec_calls(),
            vec![
                ("npm install --silent".to_string(), 60_000),
                ("node /workspace/main.js".to_string(), 90_000),
            ]
        );
    }

    #[tokio::test]
    async fn test_python_guard_is_injected_with_wrapper() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let mut req = request(Runtime::Python, RunSpecification::inline("import urllib.request"));
        req.policy.allow_network = Some(true);
        req.policy.allowed_hosts = Some(vec!["*.example.com".to_string()]);

        runner(&sandbox).run(&req).await.unwrap();

        let guard = sandbox.file("__network_guard__.py").unwrap();
        assert!(guard.contains(r#"_allowed_hosts = ["*.example.com"]"#));
        assert!(sandbox.file("__main_wrapper__.py").is_some());
        assert_eq!(sandbox.commands(), vec!["python3 /workspace/__main_wrapper__.py"]);
    }

    #[tokio::test]
    async fn test_node_guard_is_preloaded() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let mut req = request(Runtime::Node, RunSpecification::inline("fetch('https://x')"));
        req.policy.allow_network = Some(true);
        req.policy.allowed_hosts = Some(vec!["api.github.com".to_string()]);

        runner(&sandbox).run(&req).await.unwrap();

        assert!(sandbox.file("__network_guard__.js").is_some());
        assert_eq!(
            sandbox.commands(),
            vec!["node -r /workspace/__network_guard__.js /workspace/main.js"]
        );
    }

    #[tokio::test]
    async fn test_no_guard_without_allow_list() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let mut req = request(Runtime::Python, RunSpecification::inline("print(1)"));
        req.policy.allow_network = Some(true);

        runner(&sandbox).run(&req).await.unwrap();
        assert_eq!(sandbox.written_paths(), vec!["main.py"]);
    }

    #[tokio::test]
    async fn test_strict_mode_guards_every_run() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let runner = SandboxRunner::new(
            Arc::new(ScriptedProvider::new(sandbox.clone())),
            RuntimesConfig::default(),
            NetworkGuardSynthesizer::new(true),
        );

        runner
            .run(&request(Runtime::Node, RunSpecification::inline("1")))
            .await
            .unwrap();
        let guard = sandbox.file("__network_guard__.js").unwrap();
        assert!(guard.contains("const allowedHosts = [];"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_124() {
        let sandbox = ScriptedSandbox::new("/workspace")
            .with_exec(Err(BackendError::Timeout { timeout_ms: 100 }));
        let mut req = request(Runtime::Python, RunSpecification::inline("while True: pass"));
        req.policy.timeout_ms = Some(100);

        let report = runner(&sandbox).run(&req).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::TimedOut);
        assert_eq!(report.result.exit_code, 124);
        assert!(report.result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_backend_fault_is_an_executor_error() {
        let sandbox = ScriptedSandbox::new("/workspace")
            .with_exec(Err(BackendError::fault_with_cause("exec failed", "container gone")));

        let report = runner(&sandbox)
            .run(&request(Runtime::Python, RunSpecification::inline("print(1)")))
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::ExecutorError);
        assert_eq!(report.result.exit_code, 1);
        assert_eq!(
            report.result.stderr,
            "SandboxError: exec failed\nCause: container gone"
        );
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let line = "x".repeat(99);
        let stdout = format!("{}\n", line).repeat(10_000);
        let sandbox = ScriptedSandbox::new("/workspace").with_exit(&stdout, "noise", 0);
        let mut req = request(Runtime::Python, RunSpecification::inline("spam()"));
        req.policy.max_output_bytes = Some(1024);

        let report = runner(&sandbox).run(&req).await.unwrap();
        assert!(report.result.stdout.len() <= 1024);
        assert!(report
            .result
            .stdout
            .ends_with("bytes exceeds limit of 1024 bytes)"));
        assert!(report.result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let report = runner(&sandbox)
            .run(&request(Runtime::Python, RunSpecification::inline("")))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Rejected);
        assert_eq!(report.result.exit_code, 1);
        assert_eq!(report.result.stderr, "SandboxError: No code or files provided");
        assert!(sandbox.exec_calls().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_is_an_error() {
        let runner = SandboxRunner::new(
            Arc::new(ScriptedProvider::unavailable()),
            RuntimesConfig::default(),
            NetworkGuardSynthesizer::default(),
        );
        let err = runner
            .run(&request(Runtime::Python, RunSpecification::inline("print(1)")))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Open { .. }));
    }

    #[tokio::test]
    async fn test_write_failure_is_an_error() {
        let sandbox = ScriptedSandbox::new("/workspace").failing_writes();
        let err = runner(&sandbox)
            .run(&request(Runtime::Node, RunSpecification::inline("1")))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Workspace { ref path, .. } if path == "main.js"));
    }

    #[tokio::test]
    async fn test_lease_is_released_after_run() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let runner = runner(&sandbox);
        runner
            .run(&request(Runtime::Python, RunSpecification::inline("print(1)")))
            .await
            .unwrap();
        assert_eq!(runner.locks.active(), 0);
    }

    #[tokio::test]
    async fn test_same_run_id_reopens_workspace() {
        let sandbox = ScriptedSandbox::new("/workspace");
        let provider = Arc::new(ScriptedProvider::new(sandbox.clone()));
        let runner = SandboxRunner::new(
            provider.clone(),
            RuntimesConfig::default(),
            NetworkGuardSynthesizer::default(),
        );

        for code in ["print('one')", "print('two')"] {
            runner
                .run(&request(Runtime::Python, RunSpecification::inline(code)))
                .await
                .unwrap();
        }

        assert_eq!(provider.opened(), vec!["run-1", "run-1"]);
        assert_eq!(sandbox.file("main.py").as_deref(), Some("print('two')"));
    }

    #[tokio::test]
    async fn test_simulated_runner() {
        let runner = SandboxRunner::simulated();
        assert!(runner.is_simulated());
        assert_eq!(runner.backend_name(), "simulation");

        let report = runner
            .run(&request(Runtime::Python, RunSpecification::inline("print(1)")))
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.result.stdout.contains("Preview Mode"));

        let mut req = request(Runtime::Python, RunSpecification::inline("print(1)"));
        req.policy.timeout_ms = Some(0);
        let report = runner.run(&req).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::TimedOut);
        assert_eq!(report.result.exit_code, 124);
        assert!(report.result.stdout.is_empty());
    }

    #[test]
    fn test_from_config_selects_backend() {
        let mut config = SandboxConfig::default();
        config.backend.kind = BackendKind::Simulation;
        assert!(SandboxRunner::from_config(&config).unwrap().is_simulated());

        let dir = tempfile::tempdir().unwrap();
        config.backend.kind = BackendKind::Local;
        config.backend.workspace_dir = dir.path().to_path_buf();
        let runner = SandboxRunner::from_config(&config).unwrap();
        assert_eq!(runner.backend_name(), "local");
    }
}
