//! Configuration for the batch module.

use serde::{Deserialize, Serialize};

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 4;

/// Configuration for batch dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum parallel conversions. Unset means [`default_worker_count`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
}

impl BatchConfig {
    /// Effective number of workers, never below one.
    pub fn worker_count(&self) -> usize {
        resolve_worker_count(self.max_workers)
    }
}

/// `min(4, available cores)`, falling back to one core if unknown.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// Explicit counts are clamped to at least one.
pub fn resolve_worker_count(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(default_worker_count).max(1)
}
