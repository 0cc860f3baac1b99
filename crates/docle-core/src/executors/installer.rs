//! Package installation ahead of execution.
//!
//! Writes a dependency manifest in the runtime's native format and drives the
//! runtime's package manager inside the sandbox. Installation runs under its
//! own sub-timeout, capped at 60 seconds regardless of the run budget.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::types::RuntimesConfig;
use crate::core_types::Runtime;
use crate::errors::BackendError;
use crate::executors::{shell_quote, ExecOptions, RawOutput, Sandbox};

/// Hard ceiling for any install step.
pub const MAX_INSTALL_TIMEOUT_MS: u64 = 60_000;

/// Prefix put on the installer's stderr when installation fails.
pub const INSTALL_FAILURE_MARKER: &str = "Package installation failed:\n";

/// Installer results use the same shape as execution results.
pub type InstallOutput = RawOutput;

#[derive(Debug, Serialize)]
struct NodeManifest {
    name: &'static str,
    version: &'static str,
    dependencies: BTreeMap<String, String>,
}

pub struct PackageInstaller<'a> {
    runtimes: &'a RuntimesConfig,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(runtimes: &'a RuntimesConfig) -> Self {
        Self { runtimes }
    }

    /// Manifest written for `runtime`, relative to the workspace root.
    pub fn manifest_name(runtime: Runtime) -> &'static str {
        match runtime {
            Runtime::Python => "requirements.txt",
            Runtime::Node => "package.json",
        }
    }

    pub fn sub_timeout(run_timeout_ms: u64) -> u64 {
        run_timeout_ms.min(MAX_INSTALL_TIMEOUT_MS)
    }

    /// Writes the manifest and runs the install command. Backend timeouts and
    /// faults during the install command are folded into an `InstallOutput`
    /// with exit code 1; a manifest write failure is returned as an error.
    pub async fn install(
        &self,
        sandbox: &dyn Sandbox,
        runtime: Runtime,
        packages: &[String],
        run_timeout_ms: u64,
    ) -> Result<InstallOutput, BackendError> {
        let root = sandbox.workspace_root().to_string();
        let manifest = match runtime {
            Runtime::Python => Self::requirements_txt(packages),
            Runtime::Node => Self::package_json(packages),
        };
        sandbox
            .write_file(Self::manifest_name(runtime), &manifest)
            .await?;

        let command = self.install_command(runtime, &root);
        let timeout_ms = Self::sub_timeout(run_timeout_ms);
        log::info!(
            "Installing {} {} package(s) with '{}' (timeout {}ms)",
            packages.len(),
            runtime,
            command,
            timeout_ms
        );

        match sandbox.exec(&command, &ExecOptions { timeout_ms }).await {
            Ok(output) => {
                if output.exit_code != 0 {
                    log::warn!("Package installation exited with {}", output.exit_code);
                }
                Ok(output)
            }
            Err(err) => {
                log::warn!("Package installation failed in backend: {}", err);
                Ok(InstallOutput {
                    stdout: String::new(),
                    stderr: err.to_string(),
                    exit_code: 1,
                })
            }
        }
    }

    pub fn install_command(&self, runtime: Runtime, root: &str) -> String {
        self.runtimes
            .for_runtime(runtime)
            .install_command
            .replace("{root}", &shell_quote(root.trim_end_matches('/')))
    }

    /// One specifier per line, passed through untouched.
    pub fn requirements_txt(packages: &[String]) -> String {
        packages.join("\n")
    }

    pub fn package_json(packages: &[String]) -> String {
        let dependencies = packages
            .iter()
            .map(|spec| {
                let (name, version) = split_node_spec(spec);
                (name.to_string(), version.to_string())
            })
            .collect();
        let manifest = NodeManifest {
            name: "docle-sandbox",
            version: "1.0.0",
            dependencies,
        };
        serde_json::to_string_pretty(&manifest).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Splits `name@version` at the first `@` after an optional scope prefix.
/// A missing or empty version becomes `latest`.
pub fn split_node_spec(spec: &str) -> (&str, &str) {
    let search_from = if spec.starts_with('@') { 1 } else { 0 };
    match spec[search_from..].find('@') {
        Some(idx) => {
            let at = search_from + idx;
            let version = &spec[at + 1..];
            (&spec[..at], if version.is_empty() { "latest" } else { version })
        }
        None => (spec, "latest"),
    }
}
