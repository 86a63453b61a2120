//! Types for the batch module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::task::{TaskId, TaskStatus};

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Accepting tasks, not started.
    #[default]
    Idle,
    /// Dispatching tasks to workers.
    Running,
    /// Every task is terminal.
    Completed,
    /// Stopped early because the conversion backend is unusable.
    Aborted,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate view of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchState {
    pub status: BatchStatus,
    /// Tasks enqueued, skipped ones included.
    pub total_tasks: usize,
    /// Tasks that succeeded.
    pub completed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub cancelled_count: usize,
    /// Fraction done of every running task.
    pub in_flight: BTreeMap<TaskId, f32>,
    /// Overall fraction done, 0.0 to 1.0.
    pub overall_progress: f32,
}

impl BatchState {
    /// Tasks in a terminal state.
    pub fn terminal_count(&self) -> usize {
        self.completed_count + self.failed_count + self.skipped_count + self.cancelled_count
    }

    /// Tasks neither terminal nor running.
    pub fn queued_count(&self) -> usize {
        self.total_tasks
            .saturating_sub(self.terminal_count())
            .saturating_sub(self.in_flight.len())
    }

    /// Counts one more terminal task.
    pub(crate) fn record_terminal(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Succeeded => self.completed_count += 1,
            TaskStatus::Failed => self.failed_count += 1,
            TaskStatus::Skipped => self.skipped_count += 1,
            TaskStatus::Cancelled => self.cancelled_count += 1,
            TaskStatus::Queued | TaskStatus::Running => {}
        }
    }

    /// Recomputes `overall_progress` from counts and in-flight fractions.
    pub(crate) fn refresh_progress(&mut self) {
        self.overall_progress = if self.total_tasks == 0 {
            1.0
        } else {
            let running: f32 = self.in_flight.values().sum();
            ((self.terminal_count() as f32 + running) / self.total_tasks as f32).clamp(0.0, 1.0)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_progress_is_complete() {
        let mut state = BatchState::default();
        state.refresh_progress();
        assert_eq!(state.overall_progress, 1.0);
    }

    #[test]
    fn test_progress_counts_in_flight_fractions() {
        let mut state = BatchState {
            total_tasks: 4,
            ..Default::default()
        };
        state.record_terminal(TaskStatus::Succeeded);
        state.record_terminal(TaskStatus::Skipped);
        state.in_flight.insert(TaskId(3), 0.5);
        state.refresh_progress();

        assert_eq!(state.terminal_count(), 2);
        assert_eq!(state.queued_count(), 1);
        assert!((state.overall_progress - 0.625).abs() < f32::EPSILON);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!BatchStatus::Idle.is_terminal());
        assert!(!BatchStatus::Running.is_terminal());
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Aborted.is_terminal());
        assert_eq!(BatchStatus::Aborted.to_string(), "aborted");
    }
}
