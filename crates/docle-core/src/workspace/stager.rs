//! Materializes a run specification into the sandbox workspace.

use crate::core_types::{RunSpecification, Runtime};
use crate::errors::StageError;
use crate::executors::{workspace_path, Sandbox};

/// Files written for a run, plus the resolved entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWorkspace {
    pub root: String,
    /// Entrypoint relative to `root`.
    pub entrypoint: String,
    pub written: Vec<String>,
}

impl StagedWorkspace {
    pub fn entrypoint_path(&self) -> String {
        workspace_path(&self.root, &self.entrypoint)
    }
}

async fn write(sandbox: &dyn Sandbox, path: &str, content: &str) -> Result<(), StageError> {
    sandbox
        .write_file(path, content)
        .await
        .map_err(|source| StageError::Write {
            path: path.to_string(),
            source,
        })
}

pub struct WorkspaceStager;

impl WorkspaceStager {
    /// Writes the submission into the workspace. Staging the same run twice
    /// overwrites earlier files; entries are written in order, so a repeated
    /// path keeps its last content.
    pub async fn stage(
        sandbox: &dyn Sandbox,
        runtime: Runtime,
        spec: &RunSpecification,
    ) -> Result<StagedWorkspace, StageError> {
        let root = sandbox.workspace_root().to_string();

        match spec {
            RunSpecification::Files { files, entrypoint } if !files.is_empty() => {
                let mut written = Vec::with_capacity(files.len());
                for file in files {
                    write(sandbox, &file.path, &file.content).await?;
                    written.push(file.path.clone());
                }
                let entrypoint = entrypoint
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| runtime.default_entrypoint().to_string());
                log::debug!(
                    "Staged {} files under {}, entrypoint {}",
                    written.len(),
                    root,
                    entrypoint
                );
                Ok(StagedWorkspace {
                    root,
                    entrypoint,
                    written,
                })
            }
            RunSpecification::Inline { code } if !code.is_empty() => {
                let filename = runtime.default_entrypoint();
                write(sandbox, filename, code).await?;
                Ok(StagedWorkspace {
                    root,
                    entrypoint: filename.to_string(),
                    written: vec![filename.to_string()],
                })
            }
            _ => Err(StageError::NoSourceProvided),
        }
    }
}
