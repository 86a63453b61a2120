//! Reporter that records every notification.

use std::sync::Mutex;

use crate::batch::BatchState;
use crate::reporter::{BatchEvent, ProgressReporter};
use crate::task::{TaskId, TaskResult};

/// Keeps every event in arrival order for later assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<BatchEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    pub fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events concerning one task, in order.
    pub fn events_for(&self, task_id: TaskId) -> Vec<BatchEvent> {
        self.events()
            .into_iter()
            .filter(|event| match event {
                BatchEvent::TaskStarted { task_id: id }
                | BatchEvent::TaskProgress { task_id: id, .. }
                | BatchEvent::TaskFinished { task_id: id, .. } => *id == task_id,
                BatchEvent::BatchFinished { .. } => false,
            })
            .collect()
    }

    /// Ids of tasks that got `on_task_started`.
    pub fn started(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BatchEvent::TaskStarted { task_id } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    /// Results delivered through `on_task_finished`.
    pub fn finished(&self) -> Vec<TaskResult> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BatchEvent::TaskFinished { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    /// States delivered through `on_batch_finished`.
    pub fn batch_finished(&self) -> Vec<BatchState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BatchEvent::BatchFinished { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: BatchEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressReporter for RecordingReporter {
    fn on_task_started(&self, task_id: TaskId) {
        self.push(BatchEvent::TaskStarted { task_id });
    }

    fn on_task_progress(&self, task_id: TaskId, fraction: f32) {
        self.push(BatchEvent::TaskProgress { task_id, fraction });
    }

    fn on_task_finished(&self, task_id: TaskId, result: &TaskResult) {
        self.push(BatchEvent::TaskFinished {
            task_id,
            result: result.clone(),
        });
    }

    fn on_batch_finished(&self, state: &BatchState) {
        self.push(BatchEvent::BatchFinished {
            state: state.clone(),
        });
    }
}
