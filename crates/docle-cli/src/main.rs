//! Command-line host for the Docle sandbox
//!
//! Runs one submission, either inline code, local files, or a public GitHub
//! repository, through `SandboxRunner` and prints the run record as JSON.
//! The process exits with the program's exit code, so the binary composes
//! with shell scripts the same way the submitted program would.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docle_core::{
    ConfigLoader, ExecutionResult, FileEntry, GitHubRepoFetcher, PolicyInput, RunId, RunRequest,
    RunSpecification, Runtime, SandboxRunner, Usage,
};
use log::LevelFilter;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Docle - run untrusted code in a sandbox")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, help = "Config file (default: ~/.docle/docle.yaml)")]
    config: Option<PathBuf>,

    #[clap(long, short, help = "Log level; overrides logging.level from the config")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run inline code or local files
    Run {
        #[clap(long, help = "python or node")]
        lang: Runtime,

        #[clap(long, conflicts_with = "file")]
        code: Option<String>,

        #[clap(long, num_args = 1.., help = "Source files, staged flat by file name")]
        file: Vec<PathBuf>,

        #[clap(long)]
        entrypoint: Option<String>,

        #[clap(long = "package", short = 'p')]
        packages: Vec<String>,

        #[clap(long, help = "Run identifier; a fresh UUID when omitted")]
        run_id: Option<String>,

        #[clap(flatten)]
        policy: PolicyArgs,
    },
    /// Fetch a public GitHub repository and run it
    Repo {
        url: String,

        #[clap(flatten)]
        policy: PolicyArgs,
    },
}

#[derive(Args, Debug)]
struct PolicyArgs {
    #[clap(long)]
    timeout_ms: Option<i64>,

    #[clap(long)]
    allow_network: bool,

    #[clap(long = "allow-host")]
    allowed_hosts: Vec<String>,

    #[clap(long)]
    max_output_bytes: Option<i64>,
}

impl PolicyArgs {
    fn into_input(self) -> PolicyInput {
        PolicyInput {
            timeout_ms: self.timeout_ms,
            allow_network: Some(self.allow_network),
            allowed_hosts: (!self.allowed_hosts.is_empty()).then_some(self.allowed_hosts),
            max_output_bytes: self.max_output_bytes,
        }
    }
}

/// Record printed for every run, in the shape the hosted service stores.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRecord {
    id: String,
    ok: bool,
    exit_code: i32,
    stdout: String,
    stderr: String,
    usage: Usage,
    created_at: String,
}

impl RunRecord {
    fn new(id: &RunId, result: ExecutionResult) -> Self {
        Self {
            id: id.to_string(),
            ok: result.is_success(),
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            usage: result.usage,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::from_file(path).await?,
        None => match ConfigLoader::default_path() {
            Some(path) => ConfigLoader::from_source(path).await?,
            None => ConfigLoader::from_str("")?,
        },
    };

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.logging.level.as_str());
    let log_level_filter = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    let runner = SandboxRunner::from_config(&config)?;
    log::info!("Using {} backend", runner.backend_name());

    let request = match cli.command {
        Commands::Run {
            lang,
            code,
            file,
            entrypoint,
            packages,
            run_id,
            policy,
        } => {
            let files = read_files(&file).await?;
            let run_id = match run_id {
                Some(id) => RunId::new(id)?,
                None => fresh_run_id()?,
            };
            RunRequest {
                run_id,
                runtime: lang,
                spec: RunSpecification::from_parts(code, Some(files), entrypoint),
                packages,
                policy: policy.into_input(),
            }
        }
        Commands::Repo { url, policy } => {
            let fetcher = GitHubRepoFetcher::new(config.repo.clone())?;
            let (runtime, spec, packages) = fetcher.resolve(&url).await?.into_parts();
            RunRequest {
                run_id: fresh_run_id()?,
                runtime,
                spec,
                packages,
                policy: policy.into_input(),
            }
        }
    };

    // The sandbox is released whether or not the run produced a report.
    let outcome = runner.run(&request).await;
    if let Err(e) = runner.release(&request.run_id, request.runtime).await {
        log::warn!("Failed to release sandbox for {}: {}", request.run_id, e);
    }
    let report = outcome?;
    log::debug!("Run {} finished as {:?}", request.run_id, report.outcome);

    let record = RunRecord::new(&request.run_id, report.into_result());
    println!("{}", serde_json::to_string_pretty(&record)?);

    std::process::exit(record.exit_code.clamp(0, 255));
}

fn fresh_run_id() -> Result<RunId> {
    Ok(RunId::new(uuid::Uuid::new_v4().to_string())?)
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<FileEntry>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file path: {}", path.display()))?;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(FileEntry::new(name, content));
    }
    Ok(files)
}
