//! Offline preview used when no real backend is bound.
//!
//! Nothing is executed. The result only summarizes what would have run, so
//! local tooling can be exercised without Docker or interpreters.

use crate::core_types::{ExecutionResult, RunSpecification, Runtime, Usage};
use crate::executors::TIMEOUT_EXIT_CODE;
use crate::policy::{normalize, PolicyInput};

/// Number of source characters shown in the preview.
pub const PREVIEW_CHARS: usize = 200;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Builds the preview result. A raw `timeoutMs` below 1 reports a timeout
/// (exit 124, stderr `timeout`) so callers can exercise that path offline.
pub fn simulate(
    runtime: Runtime,
    spec: &RunSpecification,
    packages: &[String],
    policy: &PolicyInput,
) -> ExecutionResult {
    let usage = Usage {
        duration_ms: 0,
        cpu_ms: Some(0),
        mem_mb: Some(0),
    };

    if policy.timeout_ms.is_some_and(|t| t < 1) {
        return ExecutionResult {
            stdout: String::new(),
            stderr: "timeout".to_string(),
            exit_code: TIMEOUT_EXIT_CODE,
            usage,
        };
    }

    let normalized = normalize(policy);
    let file_info = spec
        .file_count()
        .map(|n| format!(" ({} files)", n))
        .unwrap_or_default();
    let package_info = if packages.is_empty() {
        String::new()
    } else {
        format!("\nPackages: {}", packages.join(", "))
    };

    let stdout = format!(
        concat!(
            "Docle Sandbox (Preview Mode)\n{rule}\n",
            "Language: {runtime}{files}{packages}\nTimeout: {timeout}ms\n{rule}\n\n",
            "No execution backend is configured; nothing was run.\n\n",
            "Your code will execute:\n{rule}\n{source}\n{rule}",
        ),
        rule = RULE,
        runtime = runtime,
        files = file_info,
        packages = package_info,
        timeout = normalized.timeout_ms,
        source = source_preview(spec),
    );

    ExecutionResult {
        stdout,
        stderr: String::new(),
        exit_code: 0,
        usage,
    }
}

fn source_preview(spec: &RunSpecification) -> String {
    let source = match spec {
        RunSpecification::Inline { code } => code.clone(),
        RunSpecification::Files { files, .. } => files
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    };

    let mut chars = source.chars();
    let preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", preview)
    } else {
        preview
    }
}
