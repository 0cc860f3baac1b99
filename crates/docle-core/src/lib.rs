//! Execution policy and sandbox orchestration for the Docle code runner.
//!
//! This crate takes a validated run request (source code or a file tree, a
//! package list, and a partial execution policy) and turns it into a single
//! guarded, time-bounded execution inside an isolated sandbox. Whatever the
//! submitted program does, the caller gets back a well-formed
//! [`ExecutionResult`].
//!
//! # Architecture Overview
//!
//! - **Policy**: defaults and clamps caller input into an [`ExecutionPolicy`]
//! - **Workspace**: stages files into a run-scoped workspace and serializes
//!   runs that share an identifier
//! - **Executors**: the sandbox backend traits, the Docker and local backends,
//!   package installation and command composition
//! - **Guard**: renders the per-runtime network allow-list module
//! - **Output**: caps the combined size of stdout and stderr
//! - **Simulation**: an offline preview used when no backend is bound
//! - **Repo**: resolves a public GitHub repository into a submission
//! - **Runner**: drives a request through the whole pipeline
//! - **Configuration**: YAML config with environment overrides

pub mod config;
pub mod core_types;
pub mod errors;
pub mod executors;
pub mod guard;
pub mod output;
pub mod policy;
pub mod repo;
pub mod runner;
pub mod simulation;
pub mod workspace;

pub use config::*;
pub use core_types::{
    ExecutionResult, FileEntry, PackageSet, RunId, RunOutcome, RunReport, RunRequest,
    RunSpecification, Runtime, Usage,
};
pub use errors::{BackendError, ConfigError, RunnerError, StageError};
pub use executors::{Sandbox, SandboxProvider};
pub use guard::NetworkGuardSynthesizer;
pub use policy::{normalize, ExecutionPolicy, PolicyInput};
pub use repo::{GitHubRepoFetcher, ResolvedRepository};
pub use runner::SandboxRunner;

#[cfg(test)]
pub mod test_utils;
