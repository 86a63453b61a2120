use tracing::{debug, info, warn};

use super::ProgressReporter;
use crate::batch::BatchState;
use crate::task::{TaskId, TaskResult, TaskStatus};

/// Reporter that writes lifecycle events to `tracing`.
///
/// Progress is logged at debug level, and only when a task crosses a
/// 10% step, so a long conversion doesn't flood the log.
#[derive(Debug, Default)]
pub struct LogReporter {
    last_step: std::sync::Mutex<std::collections::HashMap<TaskId, u8>>,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for LogReporter {
    fn on_task_started(&self, task_id: TaskId) {
        info!(task_id = %task_id, "Task started");
    }

    fn on_task_progress(&self, task_id: TaskId, fraction: f32) {
        let step = (fraction.clamp(0.0, 1.0) * 10.0) as u8;
        let Ok(mut last) = self.last_step.lock() else {
            return;
        };
        if last.get(&task_id).is_some_and(|s| *s >= step) {
            return;
        }
        last.insert(task_id, step);
        debug!(task_id = %task_id, percent = step as u32 * 10, "Task progress");
    }

    fn on_task_finished(&self, task_id: TaskId, result: &TaskResult) {
        if let Ok(mut last) = self.last_step.lock() {
            last.remove(&task_id);
        }

        match result.status {
            TaskStatus::Succeeded => {
                info!(
                    task_id = %task_id,
                    source = %result.source_path.display(),
                    size_bytes = result.output_size_bytes.unwrap_or(0),
                    elapsed_ms = result.elapsed_ms,
                    "Task succeeded"
                );
                if let Some(ref warning) = result.metadata_warning {
                    warn!(task_id = %task_id, warning = %warning, "Tags were not copied");
                }
            }
            TaskStatus::Failed => warn!(
                task_id = %task_id,
                source = %result.source_path.display(),
                failure = ?result.failure,
                error = result.error_detail.as_deref().unwrap_or(""),
                "Task failed"
            ),
            status => info!(
                task_id = %task_id,
                source = %result.source_path.display(),
                status = %status,
                reason = result.error_detail.as_deref().unwrap_or(""),
                "Task did not run"
            ),
        }
    }

    fn on_batch_finished(&self, state: &BatchState) {
        info!(
            status = %state.status,
            total = state.total_tasks,
            succeeded = state.completed_count,
            failed = state.failed_count,
            skipped = state.skipped_count,
            cancelled = state.cancelled_count,
            "Batch finished"
        );
    }
}
