//! Batch coordination for conversion tasks.
//!
//! A [`BatchCoordinator`] owns one batch from enqueue to completion:
//!
//! ```text
//! Idle ──start──▶ Running ──▶ Completed
//!                    │
//!                    └─backend missing──▶ Aborted
//! ```
//!
//! Each task moves `Queued → Running → {Succeeded | Failed | Cancelled}`,
//! or straight to `Skipped` when its request fails validation. Workers are
//! bounded by a semaphore; tasks are dispatched in enqueue order and may
//! finish in any order.

mod config;
mod coordinator;
mod error;
mod types;

pub use config::{default_worker_count, resolve_worker_count, BatchConfig, MAX_DEFAULT_WORKERS};
pub use coordinator::BatchCoordinator;
pub use error::BatchError;
pub use types::{BatchState, BatchStatus};
