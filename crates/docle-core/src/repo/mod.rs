//! Turns a public GitHub repository into a runnable submission.
//!
//! `github` fetches the files; the helpers here pick the runtime, the
//! entrypoint and the package list from what was fetched.

use serde_json::Value;
use thiserror::Error;

use crate::core_types::{FileEntry, PackageSet, RunSpecification, Runtime};

pub mod github;

pub use github::{GitHubRepoFetcher, GitHubRepoRef};

/// Most packages taken from a repository manifest.
pub const MAX_REPO_PACKAGES: usize = 20;

const PYTHON_ENTRYPOINTS: &[&str] = &["main.py", "app.py", "run.py", "__main__.py", "index.py"];
const NODE_ENTRYPOINTS: &[&str] = &[
    "index.js", "main.js", "app.js", "server.js", "index.ts", "main.ts",
];

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Invalid GitHub URL '{0}'. Expected: https://github.com/owner/repo or owner/repo")]
    InvalidUrl(String),
    #[error("Repository not found: {owner}/{repo}. Make sure it's public.")]
    NotFound { owner: String, repo: String },
    #[error("GitHub API error: {status}")]
    Api { status: u16 },
    #[error("Too many files in repository ({count}). Maximum allowed: {max}")]
    TooManyFiles { count: usize, max: usize },
    #[error("No valid files found in repository. Check file extensions and sizes.")]
    NoUsableFiles,
    #[error("Failed to connect to GitHub API: {0}")]
    Http(#[from] reqwest::Error),
}

/// A fetched repository with everything needed to build a run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepository {
    pub runtime: Runtime,
    pub entrypoint: String,
    pub files: Vec<FileEntry>,
    pub packages: PackageSet,
}

impl ResolvedRepository {
    pub fn from_files(files: Vec<FileEntry>) -> Self {
        let runtime = detect_runtime(&files);
        let entrypoint = detect_entrypoint(&files, runtime);
        let packages = extract_packages(&files, runtime);
        Self {
            runtime,
            entrypoint,
            files,
            packages,
        }
    }

    pub fn into_parts(self) -> (Runtime, RunSpecification, PackageSet) {
        (
            self.runtime,
            RunSpecification::files(self.files, Some(self.entrypoint)),
            self.packages,
        )
    }
}

fn has_file(files: &[FileEntry], name: &str) -> bool {
    files.iter().any(|f| f.path == name)
}

fn is_node_source(path: &str) -> bool {
    path.ends_with(".js") || path.ends_with(".ts") || path.ends_with(".mjs")
}

fn package_json(files: &[FileEntry]) -> Option<Value> {
    let manifest = files.iter().find(|f| f.path == "package.json")?;
    match serde_json::from_str(&manifest.content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Failed to parse package.json: {}", e);
            None
        }
    }
}

/// A manifest decides first; otherwise the runtime with more source files
/// wins, and a tie goes to Node.
pub fn detect_runtime(files: &[FileEntry]) -> Runtime {
    if has_file(files, "package.json") {
        return Runtime::Node;
    }
    if has_file(files, "requirements.txt") || has_file(files, "setup.py") {
        return Runtime::Python;
    }

    let python = files.iter().filter(|f| f.path.ends_with(".py")).count();
    let node = files.iter().filter(|f| is_node_source(&f.path)).count();
    if python > node {
        Runtime::Python
    } else {
        Runtime::Node
    }
}

pub fn detect_entrypoint(files: &[FileEntry], runtime: Runtime) -> String {
    let found = match runtime {
        Runtime::Python => PYTHON_ENTRYPOINTS
            .iter()
            .find(|name| has_file(files, name))
            .map(|name| name.to_string())
            .or_else(|| {
                files
                    .iter()
                    .find(|f| f.path.ends_with(".py"))
                    .map(|f| f.path.clone())
            }),
        Runtime::Node => NODE_ENTRYPOINTS
            .iter()
            .find(|name| has_file(files, name))
            .map(|name| name.to_string())
            .or_else(|| {
                package_json(files)
                    .and_then(|pkg| pkg.get("main").and_then(Value::as_str).map(str::to_string))
                    .filter(|main| !main.is_empty())
            })
            .or_else(|| {
                files
                    .iter()
                    .find(|f| is_node_source(&f.path))
                    .map(|f| f.path.clone())
            }),
    };

    found
        .or_else(|| files.first().map(|f| f.path.clone()))
        .unwrap_or_else(|| "main.py".to_string())
}

/// Packages declared by the repository's manifest, capped at
/// [`MAX_REPO_PACKAGES`]. Node dependencies come back as `name@version`,
/// regular dependencies before dev dependencies.
pub fn extract_packages(files: &[FileEntry], runtime: Runtime) -> PackageSet {
    let mut packages: PackageSet = match runtime {
        Runtime::Python => files
            .iter()
            .find(|f| f.path == "requirements.txt")
            .map(|req| {
                req.content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        Runtime::Node => {
            let Some(pkg) = package_json(files) else {
                return Vec::new();
            };
            let mut seen = Vec::new();
            for section in ["dependencies", "devDependencies"] {
                if let Some(deps) = pkg.get(section).and_then(Value::as_object) {
                    for (name, version) in deps {
                        if seen.iter().any(|(n, _): &(String, String)| n == name) {
                            continue;
                        }
                        let version = match version {
                            Value::String(v) => v.clone(),
                            other => other.to_string(),
                        };
                        seen.push((name.clone(), version));
                    }
                }
            }
            seen.into_iter()
                .map(|(name, version)| format!("{}@{}", name, version))
                .collect()
        }
    };
    packages.truncate(MAX_REPO_PACKAGES);
    packages
}
