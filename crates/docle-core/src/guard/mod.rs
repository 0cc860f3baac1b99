//! Network guard synthesis.
//!
//! A guard is source text in the target runtime's own language. It is loaded
//! ahead of the entrypoint and wraps the runtime's outbound HTTP primitive so
//! that every request is checked against the host allow-list. This is
//! cooperative enforcement: code that opens raw sockets, spawns subprocesses
//! or restores the original primitive is not stopped by it. Deployments that
//! need a hard boundary should also restrict networking at the backend (for
//! example `network_mode: none` on the Docker backend).
//!
//! Host matching lives here as one pure function. Each template embeds an
//! equivalent implementation in its own language, and the tests for both
//! templates check against this one.

use sha2::{Digest, Sha256};

use crate::core_types::Runtime;
use crate::policy::ExecutionPolicy;

mod node;
mod python;

pub use node::NodeGuard;
pub use python::PythonGuard;

/// Base name of the generated guard file; the runtime supplies the extension.
pub const GUARD_MODULE_NAME: &str = "__network_guard__";

/// Returns true when `host` matches a single allow-list pattern.
///
/// - `*.suffix` matches `suffix` itself and any subdomain of it.
/// - `*rest` matches any host ending in `rest`.
/// - Anything else must match exactly.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    if let Some(domain) = pattern.strip_prefix("*.") {
        host == domain || host.ends_with(&format!(".{}", domain))
    } else if let Some(rest) = pattern.strip_prefix('*') {
        host.ends_with(rest)
    } else {
        host == pattern
    }
}

pub fn is_host_allowed<S: AsRef<str>>(patterns: &[S], host: &str) -> bool {
    patterns.iter().any(|p| host_matches(p.as_ref(), host))
}

/// Message used by every guard when a request is refused.
pub fn denial_message(host: &str) -> String {
    format!("Network access denied: {} is not in allowed hosts list", host)
}

/// A rendered guard ready to be written into the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardModule {
    pub runtime: Runtime,
    pub file_name: String,
    pub source: String,
}

impl GuardModule {
    /// SHA-256 of the rendered source, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Guard templates, one variant per runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardTemplate {
    Python(PythonGuard),
    Node(NodeGuard),
}

impl GuardTemplate {
    pub fn for_runtime(runtime: Runtime, allowed_hosts: &[String]) -> Self {
        match runtime {
            Runtime::Python => GuardTemplate::Python(PythonGuard::new(allowed_hosts)),
            Runtime::Node => GuardTemplate::Node(NodeGuard::new(allowed_hosts)),
        }
    }

    pub fn runtime(&self) -> Runtime {
        match self {
            GuardTemplate::Python(_) => Runtime::Python,
            GuardTemplate::Node(_) => Runtime::Node,
        }
    }

    pub fn render(&self) -> GuardModule {
        let source = match self {
            GuardTemplate::Python(guard) => guard.render(),
            GuardTemplate::Node(guard) => guard.render(),
        };
        let runtime = self.runtime();
        GuardModule {
            runtime,
            file_name: format!("{}.{}", GUARD_MODULE_NAME, runtime.source_extension()),
            source,
        }
    }
}

/// JSON array literal of the host list. Valid in both Python and JavaScript.
pub(crate) fn hosts_literal(hosts: &[String]) -> String {
    serde_json::to_string(hosts).unwrap_or_else(|_| "[]".to_string())
}

/// Decides whether a run needs a guard and renders it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkGuardSynthesizer {
    /// Install a guard even when no allow-list exists, which denies every
    /// request. Off by default to match the established service behaviour.
    pub deny_without_allow_list: bool,
}

impl NetworkGuardSynthesizer {
    pub fn new(deny_without_allow_list: bool) -> Self {
        Self {
            deny_without_allow_list,
        }
    }

    pub fn synthesize(&self, runtime: Runtime, policy: &ExecutionPolicy) -> Option<GuardModule> {
        let hosts: &[String] = if policy.has_allow_list() {
            &policy.allowed_hosts
        } else if self.deny_without_allow_list {
            &[]
        } else {
            if policy.allow_network {
                log::warn!(
                    "Network enabled without an allow-list; outbound calls are unguarded"
                );
            }
            log::debug!("Guard synthesis skipped for {} run", runtime);
            return None;
        };

        let module = GuardTemplate::for_runtime(runtime, hosts).render();
        log::debug!(
            "Synthesized {} guard for {} host patterns (sha256 {})",
            runtime,
            hosts.len(),
            module.digest()
        );
        Some(module)
    }
}
