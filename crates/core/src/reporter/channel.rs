use serde::Serialize;
use tokio::sync::mpsc;

use super::ProgressReporter;
use crate::batch::BatchState;
use crate::task::{TaskId, TaskResult};

/// One reporter notification, as delivered by [`ChannelReporter`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    TaskStarted { task_id: TaskId },
    TaskProgress { task_id: TaskId, fraction: f32 },
    TaskFinished { task_id: TaskId, result: TaskResult },
    BatchFinished { state: BatchState },
}

/// Reporter that forwards every notification over an unbounded channel.
///
/// This is the shape a UI event loop consumes. Events are dropped
/// silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl ChannelReporter {
    /// Creates a reporter and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: BatchEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_task_started(&self, task_id: TaskId) {
        self.send(BatchEvent::TaskStarted { task_id });
    }

    fn on_task_progress(&self, task_id: TaskId, fraction: f32) {
        self.send(BatchEvent::TaskProgress { task_id, fraction });
    }

    fn on_task_finished(&self, task_id: TaskId, result: &TaskResult) {
        self.send(BatchEvent::TaskFinished {
            task_id,
            result: result.clone(),
        });
    }

    fn on_batch_finished(&self, state: &BatchState) {
        self.send(BatchEvent::BatchFinished {
            state: state.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (reporter, mut rx) = ChannelReporter::new();
        reporter.on_task_started(TaskId(1));
        reporter.on_task_progress(TaskId(1), 0.5);

        assert!(matches!(
            rx.try_recv().unwrap(),
            BatchEvent::TaskStarted { task_id: TaskId(1) }
        ));
        match rx.try_recv().unwrap() {
            BatchEvent::TaskProgress { task_id, fraction } => {
                assert_eq!(task_id, TaskId(1));
                assert_eq!(fraction, 0.5);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (reporter, rx) = ChannelReporter::new();
        drop(rx);
        reporter.on_task_started(TaskId(1));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(BatchEvent::TaskProgress {
            task_id: TaskId(4),
            fraction: 0.25,
        })
        .unwrap();
        assert_eq!(json["event"], "task_progress");
        assert_eq!(json["task_id"], 4);
    }
}
