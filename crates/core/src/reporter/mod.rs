//! Progress reporting for batch conversions.
//!
//! The coordinator calls a [`ProgressReporter`] as tasks move through
//! their lifecycle. For each task the calls arrive in order: started,
//! any number of progress updates, then finished. Tasks that never reach
//! a worker (skipped or cancelled while queued) only get finished.
//! Calls for different tasks interleave freely.

mod channel;
mod log;

pub use channel::{BatchEvent, ChannelReporter};
pub use log::LogReporter;

use crate::batch::BatchState;
use crate::task::{TaskId, TaskResult};

/// Receiver of batch lifecycle notifications.
///
/// Implementations must be cheap and non-blocking; they run on the
/// coordinator's tasks.
pub trait ProgressReporter: Send + Sync {
    /// A worker picked up the task.
    fn on_task_started(&self, task_id: TaskId);

    /// Encoding progress of a running task, 0.0 to 1.0.
    fn on_task_progress(&self, task_id: TaskId, fraction: f32);

    /// The task reached a terminal state.
    fn on_task_finished(&self, task_id: TaskId, result: &TaskResult);

    /// Every task is terminal.
    fn on_batch_finished(&self, state: &BatchState);
}

/// Reporter that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_task_started(&self, _task_id: TaskId) {}

    fn on_task_progress(&self, _task_id: TaskId, _fraction: f32) {}

    fn on_task_finished(&self, _task_id: TaskId, _result: &TaskResult) {}

    fn on_batch_finished(&self, _state: &BatchState) {}
}
