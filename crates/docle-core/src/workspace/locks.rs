//! Per-run-identifier serialization.
//!
//! Runs that share an identifier share a workspace. Concurrent runs against the
//! same identifier would interleave writes with another run's execution, so the
//! runner holds a lease for the identifier from staging until the result is
//! built. Distinct identifiers never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::core_types::RunId;

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct WorkspaceLocks {
    registry: Registry,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other lease for `run_id` is alive.
    pub async fn acquire(&self, run_id: &RunId) -> WorkspaceLease {
        let key = run_id.as_str().to_string();
        let handle = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = handle.clone().lock_owned().await;
        WorkspaceLease {
            key,
            registry: self.registry.clone(),
            handle,
            guard: Some(guard),
        }
    }

    /// Number of identifiers with a live lease or waiter.
    pub fn active(&self) -> usize {
        self.registry.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Exclusive access to one run identifier's workspace. Released on drop.
pub struct WorkspaceLease {
    key: String,
    registry: Registry,
    handle: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl WorkspaceLease {
    pub fn run_id(&self) -> &str {
        &self.key
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        self.guard.take();
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        // One reference lives in the registry and one in this lease; any more
        // belong to waiters that still need the entry.
        if Arc::strong_count(&self.handle) <= 2 {
            registry.remove(&self.key);
        }
    }
}
