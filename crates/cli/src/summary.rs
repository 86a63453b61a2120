//! End-of-run summary, as text or JSON.

use std::fmt::Write as _;
use std::time::Duration;

use human_repr::{HumanCount, HumanDuration};
use serde::Serialize;
use vidtune_core::{BatchState, BatchStatus, TaskResult, TaskStatus};

#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub state: &'a BatchState,
    pub results: &'a [TaskResult],
}

impl<'a> Summary<'a> {
    pub fn new(state: &'a BatchState, results: &'a [TaskResult]) -> Self {
        Self { state, results }
    }

    /// Whether the process should exit with a failure code.
    pub fn is_failure(&self) -> bool {
        self.state.status == BatchStatus::Aborted || self.state.failed_count > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for result in self.results {
            let name = result
                .source_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| result.source_path.display().to_string());

            let _ = match result.status {
                TaskStatus::Succeeded => writeln!(
                    out,
                    "  ok        {} -> {} ({}, {})",
                    name,
                    result
                        .output_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    result.output_size_bytes.unwrap_or(0).human_count_bytes(),
                    result.elapsed().human_duration(),
                ),
                status => writeln!(
                    out,
                    "  {:<9} {}: {}",
                    status.as_str(),
                    name,
                    result.error_detail.as_deref().unwrap_or("")
                ),
            };

            if let Some(ref warning) = result.metadata_warning {
                let _ = writeln!(out, "            tags not copied: {}", warning);
            }
        }

        let _ = writeln!(
            out,
            "Batch {}: {} succeeded, {} failed, {} skipped, {} cancelled of {}",
            self.state.status,
            self.state.completed_count,
            self.state.failed_count,
            self.state.skipped_count,
            self.state.cancelled_count,
            self.state.total_tasks
        );

        let total: Duration = self.results.iter().map(TaskResult::elapsed).sum();
        if !total.is_zero() {
            let _ = writeln!(out, "Time spent converting: {}", total.human_duration());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;
    use vidtune_core::{FailureKind, TaskId};

    fn result(id: u64, status: TaskStatus) -> TaskResult {
        TaskResult {
            task_id: TaskId(id),
            status,
            source_path: PathBuf::from(format!("/videos/clip{id}.mp4")),
            output_path: (status == TaskStatus::Succeeded)
                .then(|| PathBuf::from(format!("/music/clip{id}.mp3"))),
            output_size_bytes: (status == TaskStatus::Succeeded).then_some(4_200_000),
            failure: (status == TaskStatus::Failed).then_some(FailureKind::EncodeFailure),
            error_detail: (status != TaskStatus::Succeeded).then(|| "Encoding failed".to_string()),
            metadata_warning: None,
            elapsed_ms: 1500,
            finished_at: Utc::now(),
        }
    }

    fn state(status: BatchStatus, failed: usize) -> BatchState {
        BatchState {
            status,
            total_tasks: 1 + failed,
            completed_count: 1,
            failed_count: failed,
            ..Default::default()
        }
    }

    #[test]
    fn test_text_summary() {
        let results = vec![result(1, TaskStatus::Succeeded), result(2, TaskStatus::Failed)];
        let state = state(BatchStatus::Completed, 1);
        let text = Summary::new(&state, &results).to_text();

        assert!(text.contains("clip1.mp4 -> /music/clip1.mp3"));
        assert!(text.contains("failed    clip2.mp4: Encoding failed"));
        assert!(text.contains("1 succeeded, 1 failed, 0 skipped, 0 cancelled of 2"));
    }

    #[test]
    fn test_failure_exit() {
        let results = vec![result(1, TaskStatus::Succeeded)];

        let ok = state(BatchStatus::Completed, 0);
        assert!(!Summary::new(&ok, &results).is_failure());

        let failed = state(BatchStatus::Completed, 1);
        assert!(Summary::new(&failed, &results).is_failure());

        let aborted = state(BatchStatus::Aborted, 0);
        assert!(Summary::new(&aborted, &results).is_failure());
    }

    #[test]
    fn test_json_summary() {
        let results = vec![result(1, TaskStatus::Succeeded)];
        let state = state(BatchStatus::Completed, 0);
        let json: serde_json::Value =
            serde_json::from_str(&Summary::new(&state, &results).to_json().unwrap()).unwrap();

        assert_eq!(json["state"]["status"], "completed");
        assert_eq!(json["results"][0]["status"], "succeeded");
        assert_eq!(json["results"][0]["task_id"], 1);
    }
}
