// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, ExecConfig, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    InspectContainerOptions as BollardInspectContainerOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::{check_relative_path, ExecOptions, RawOutput, Sandbox, SandboxProvider};
use crate::core_types::{RunId, Runtime};
use crate::errors::BackendError;

/// Mount point of the run workspace inside every container.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    pub python_image: String,
    pub node_image: String,
    /// Memory limit per container, unlimited when `None`.
    pub memory_mb: Option<u64>,
    pub network_mode: String,
    /// Host directory holding one subdirectory per run id.
    pub workspace_dir: PathBuf,
}

impl DockerSettings {
    pub fn image_for(&self, runtime: Runtime) -> &str {
        match runtime {
            Runtime::Python => &self.python_image,
            Runtime::Node => &self.node_image,
        }
    }
}

/// Runs each run id in its own long-lived container. The container sleeps
/// forever and commands are started with `docker exec`, so packages
/// installed by one run stay warm for the next run with the same id.
pub struct DockerProvider {
    docker: Docker,
    settings: DockerSettings,
}

impl DockerProvider {
    pub fn connect(settings: DockerSettings) -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults()?;
        log::info!(
            "Docker backend ready (images: {}, {}; network: {})",
            settings.python_image,
            settings.node_image,
            settings.network_mode
        );
        Ok(Self { docker, settings })
    }

    pub fn container_name(run_id: &RunId, runtime: Runtime) -> String {
        format!("docle-{}-{}", run_id, runtime)
    }

    fn host_workspace(&self, run_id: &RunId) -> PathBuf {
        self.settings.workspace_dir.join(run_id.as_str())
    }

    /// Starts the container for `run_id` unless it is already running.
    async fn ensure_container(
        &self,
        name: &str,
        runtime: Runtime,
        host_dir: &Path,
    ) -> Result<(), BackendError> {
        match self
            .docker
            .inspect_container(name, None::<BollardInspectContainerOptionsQuery>)
            .await
        {
            Ok(info) => {
                let running = info.state.and_then(|s| s.running).unwrap_or(false);
                if !running {
                    log::debug!("Restarting stopped container {}", name);
                    self.docker
                        .start_container(name, None::<BollardStartContainerOptionsQuery>)
                        .await?;
                }
                return Ok(());
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        let image = self.settings.image_for(runtime).to_string();
        log::info!("Creating container {} from {}", name, image);

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(name.to_string()),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(CONTAINER_WORKSPACE.to_string()),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{}",
                    host_dir.display(),
                    CONTAINER_WORKSPACE
                )]),
                memory: self
                    .settings
                    .memory_mb
                    .map(|mb| (mb * 1024 * 1024) as i64),
                network_mode: Some(self.settings.network_mode.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(options, config)
            .await
            .map_err(|e| {
                BackendError::fault_with_cause(
                    format!("could not create container from image '{}'", image),
                    e.to_string(),
                )
            })?;
        self.docker
            .start_container(name, None::<BollardStartContainerOptionsQuery>)
            .await?;
        Ok(())
    }

    /// Force-removes the container for a run, if any. The host workspace is
    /// left in place.
    pub async fn remove(&self, run_id: &RunId, runtime: Runtime) -> Result<(), BackendError> {
        let name = Self::container_name(run_id, runtime);
        match self
            .docker
            .remove_container(
                &name,
                Some(BollardRemoveContainerOptionsQuery {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                log::debug!("Removed container {}", name);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SandboxProvider for DockerProvider {
    async fn open(
        &self,
        run_id: &RunId,
        runtime: Runtime,
    ) -> Result<Box<dyn Sandbox>, BackendError> {
        let host_dir = self.host_workspace(run_id);
        fs::create_dir_all(&host_dir).await?;

        let name = Self::container_name(run_id, runtime);
        self.ensure_container(&name, runtime, &host_dir).await?;

        Ok(Box::new(DockerSandbox {
            docker: self.docker.clone(),
            container: name,
            host_dir,
        }))
    }

    async fn release(&self, run_id: &RunId, runtime: Runtime) -> Result<(), BackendError> {
        self.remove(run_id, runtime).await
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}

struct DockerSandbox {
    docker: Docker,
    container: String,
    host_dir: PathBuf,
}

impl DockerSandbox {
    async fn run_exec(&self, command: &str) -> Result<RawOutput, BackendError> {
        let exec = self
            .docker
            .create_exec(
                &self.container,
                ExecConfig {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), command.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(CONTAINER_WORKSPACE.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        match self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk? {
                        LogOutput::StdOut { message } => {
                            stdout.push_str(&String::from_utf8_lossy(&message))
                        }
                        LogOutput::StdErr { message } => {
                            stderr.push_str(&String::from_utf8_lossy(&message))
                        }
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(BackendError::fault("exec started detached"));
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(-1) as i32;
        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn workspace_root(&self) -> &str {
        CONTAINER_WORKSPACE
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), BackendError> {
        let relative = check_relative_path(path)?;
        let target = self.host_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, content).await?;
        Ok(())
    }

    async fn exec(&self, command: &str, options: &ExecOptions) -> Result<RawOutput, BackendError> {
        let timeout = Duration::from_millis(options.timeout_ms);
        match tokio::time::timeout(timeout, self.run_exec(command)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Execution timed out for container {}", self.container);
                // Killing the container is the only way to stop an exec'd process.
                if let Err(e) = self
                    .docker
                    .kill_container(&self.container, None::<BollardKillContainerOptionsQuery>)
                    .await
                {
                    log::warn!(
                        "Failed to kill container {} after timeout: {}",
                        self.container,
                        e
                    );
                }
                Err(BackendError::Timeout {
                    timeout_ms: options.timeout_ms,
                })
            }
        }
    }
}
