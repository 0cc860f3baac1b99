//! Execution policy normalization
//!
//! Callers hand over a partially-specified policy; everything downstream works
//! with a fully-defaulted `ExecutionPolicy`. Normalization never rejects input:
//! out-of-range values are clamped so that schema validation stays the
//! responsibility of the request layer.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;
pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_048_576;
pub const MIN_OUTPUT_BYTES: usize = 1_024;
pub const MAX_OUTPUT_BYTES: usize = 10_485_760;

/// Policy as supplied by the caller. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_network: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_bytes: Option<i64>,
}

/// Fully-defaulted policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPolicy {
    pub timeout_ms: u64,
    pub allow_network: bool,
    /// Host patterns in caller order, duplicates removed. Only meaningful
    /// when `allow_network` is set.
    pub allowed_hosts: Vec<String>,
    pub max_output_bytes: usize,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        normalize(&PolicyInput::default())
    }
}

impl ExecutionPolicy {
    /// Re-expresses the policy as caller input.
    pub fn to_input(&self) -> PolicyInput {
        PolicyInput {
            timeout_ms: Some(self.timeout_ms as i64),
            allow_network: Some(self.allow_network),
            allowed_hosts: Some(self.allowed_hosts.clone()),
            max_output_bytes: Some(self.max_output_bytes as i64),
        }
    }

    /// True when the caller asked for network access and named at least one host.
    pub fn has_allow_list(&self) -> bool {
        self.allow_network && !self.allowed_hosts.is_empty()
    }
}

/// Applies defaults and clamps ranges. Pure and total.
pub fn normalize(input: &PolicyInput) -> ExecutionPolicy {
    let timeout_ms = input
        .timeout_ms
        .map(|t| t.clamp(MIN_TIMEOUT_MS as i64, MAX_TIMEOUT_MS as i64) as u64)
        .unwrap_or(DEFAULT_TIMEOUT_MS);

    let max_output_bytes = input
        .max_output_bytes
        .map(|b| b.clamp(MIN_OUTPUT_BYTES as i64, MAX_OUTPUT_BYTES as i64) as usize)
        .unwrap_or(DEFAULT_MAX_OUTPUT_BYTES);

    let mut allowed_hosts: Vec<String> = Vec::new();
    for host in input.allowed_hosts.iter().flatten() {
        if !allowed_hosts.contains(host) {
            allowed_hosts.push(host.clone());
        }
    }

    ExecutionPolicy {
        timeout_ms,
        allow_network: input.allow_network.unwrap_or(false),
        allowed_hosts,
        max_output_bytes,
    }
}
