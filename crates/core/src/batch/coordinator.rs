//! Batch coordinator implementation.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::converter::{ConversionError, Converter};
use crate::metadata::{MetadataOptions, MetadataTransfer};
use crate::metrics;
use crate::reporter::ProgressReporter;
use crate::task::{
    CancelFlag, FailureKind, InvalidTaskError, TaskDescriptor, TaskId, TaskRequest, TaskResult,
};

use super::config::resolve_worker_count;
use super::error::BatchError;
use super::types::{BatchState, BatchStatus};

/// Buffered progress updates per running task.
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

const CANCELLED_DETAIL: &str = "batch cancelled";
const ABORTED_DETAIL: &str = "batch aborted";

/// Mutable batch data, guarded by one lock.
#[derive(Default)]
struct Shared {
    state: BatchState,
    /// Valid tasks waiting for `start`, in enqueue order.
    queue: Vec<TaskDescriptor>,
    results: BTreeMap<TaskId, TaskResult>,
    /// Output files claimed by queued tasks, see [`output_key`].
    outputs: HashSet<PathBuf>,
    next_id: u64,
    aborted: bool,
}

struct Inner<C, M> {
    id: Uuid,
    converter: C,
    metadata: M,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelFlag,
    shared: Mutex<Shared>,
    done_tx: watch::Sender<bool>,
}

/// Runs a batch of conversions on a bounded worker pool.
///
/// Tasks are validated on enqueue, dispatched in enqueue order once the
/// batch starts, and every task ends with exactly one [`TaskResult`].
/// Cloning yields another handle to the same batch.
pub struct BatchCoordinator<C: Converter, M: MetadataTransfer> {
    inner: Arc<Inner<C, M>>,
}

impl<C: Converter, M: MetadataTransfer> Clone for BatchCoordinator<C, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Converter + 'static, M: MetadataTransfer + 'static> BatchCoordinator<C, M> {
    /// Creates an idle, empty batch.
    pub fn new(converter: C, metadata: M, reporter: Arc<dyn ProgressReporter>) -> Self {
        let (done_tx, _) = watch::channel(false);
        let mut shared = Shared::default();
        shared.state.refresh_progress();

        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                converter,
                metadata,
                reporter,
                cancel: CancelFlag::new(),
                shared: Mutex::new(shared),
                done_tx,
            }),
        }
    }

    /// Identifier used in log lines for this batch.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Adds tasks to the batch.
    ///
    /// Each request gets the next id. Requests that fail validation are
    /// recorded as `Skipped` right away and never reach a worker.
    pub async fn enqueue(
        &self,
        requests: impl IntoIterator<Item = TaskRequest>,
    ) -> Result<Vec<TaskId>, BatchError> {
        let mut skipped = Vec::new();
        let mut ids = Vec::new();

        {
            let mut shared = self.inner.shared.lock().await;
            if shared.state.status != BatchStatus::Idle {
                return Err(BatchError::NotIdle(shared.state.status));
            }

            for request in requests {
                shared.next_id += 1;
                let id = TaskId(shared.next_id);
                shared.state.total_tasks += 1;
                ids.push(id);

                let source_path = request.source_path.clone();
                let validated = TaskDescriptor::new(id, request).and_then(|task| {
                    if shared.outputs.insert(output_key(task.output_path())) {
                        Ok(task)
                    } else {
                        Err(InvalidTaskError::OutputConflict {
                            path: task.output_path().to_path_buf(),
                        })
                    }
                });
                match validated {
                    Ok(task) => {
                        debug!(task_id = %id, source = %task.source_path().display(), "Task queued");
                        shared.queue.push(task);
                    }
                    Err(e) => {
                        info!(task_id = %id, source = %source_path.display(), error = %e, "Task skipped");
                        let result = TaskResult::skipped(id, source_path, &e);
                        shared.state.record_terminal(result.status);
                        shared.results.insert(id, result.clone());
                        skipped.push(result);
                    }
                }
            }
            shared.state.refresh_progress();
        }

        for result in &skipped {
            metrics::record_task_result(result, None);
            self.inner.reporter.on_task_finished(result.task_id, result);
        }

        Ok(ids)
    }

    /// Starts dispatching in the background.
    ///
    /// `None` uses [`super::default_worker_count`]; explicit counts are
    /// clamped to at least one. The converter is validated first: if the
    /// backend is unusable no task starts, every queued task is cancelled
    /// and the batch ends `Aborted`.
    pub async fn start(&self, worker_count: Option<usize>) -> Result<(), BatchError> {
        let workers = resolve_worker_count(worker_count);

        let has_work = {
            let mut shared = self.inner.shared.lock().await;
            if shared.state.status != BatchStatus::Idle {
                return Err(BatchError::NotIdle(shared.state.status));
            }
            shared.state.status = BatchStatus::Running;
            !shared.queue.is_empty()
        };

        info!(
            batch_id = %self.inner.id,
            converter = self.inner.converter.name(),
            workers,
            "Starting batch"
        );

        if has_work {
            if let Err(e) = self.inner.converter.validate().await {
                error!(batch_id = %self.inner.id, error = %e, "Conversion backend failed preflight check");
                self.inner.mark_aborted().await;
                let queue = std::mem::take(&mut self.inner.shared.lock().await.queue);
                for task in &queue {
                    self.inner.finish_unstarted(task).await;
                }
                self.inner.finish_batch().await;
                return Err(BatchError::ExternalToolMissing(e));
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.dispatch(workers).await;
        });

        Ok(())
    }

    /// Requests cooperative cancellation.
    ///
    /// Running tasks stop at their next progress check; queued tasks are
    /// cancelled without starting.
    pub fn cancel(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!(batch_id = %self.inner.id, "Batch cancellation requested");
        }
        self.inner.cancel.cancel();
    }

    /// Current aggregate state.
    pub async fn snapshot(&self) -> BatchState {
        self.inner.shared.lock().await.state.clone()
    }

    /// Results recorded so far, ordered by task id.
    pub async fn results(&self) -> Vec<TaskResult> {
        self.inner
            .shared
            .lock()
            .await
            .results
            .values()
            .cloned()
            .collect()
    }

    /// Waits until the batch is `Completed` or `Aborted`.
    ///
    /// Returns immediately with the current state if the batch was never
    /// started or has already finished.
    pub async fn wait(&self) -> BatchState {
        let mut done_rx = self.inner.done_tx.subscribe();
        {
            let shared = self.inner.shared.lock().await;
            let status = shared.state.status;
            if status == BatchStatus::Idle || status.is_terminal() {
                return shared.state.clone();
            }
        }
        // The sender lives in `inner`, so the channel can't close under us
        let _ = done_rx.wait_for(|done| *done).await;
        self.snapshot().await
    }
}

impl<C: Converter + 'static, M: MetadataTransfer + 'static> Inner<C, M> {
    /// Marks the batch aborted and interrupts everything still running.
    async fn mark_aborted(&self) {
        self.shared.lock().await.aborted = true;
        self.cancel.cancel();
    }

    async fn cancel_detail(&self) -> &'static str {
        if self.shared.lock().await.aborted {
            ABORTED_DETAIL
        } else {
            CANCELLED_DETAIL
        }
    }

    async fn dispatch(self: Arc<Self>, workers: usize) {
        let semaphore = Arc::new(Semaphore::new(workers));
        let queue = std::mem::take(&mut self.shared.lock().await.queue);
        let mut handles = Vec::with_capacity(queue.len());
        let mut pending = queue.into_iter();

        while let Some(task) = pending.next() {
            // The semaphore is never closed
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                self.finish_unstarted(&task).await;
                continue;
            };

            if self.cancel.is_cancelled() {
                drop(permit);
                self.finish_unstarted(&task).await;
                for task in pending.by_ref() {
                    self.finish_unstarted(&task).await;
                }
                break;
            }

            self.mark_running(task.id()).await;

            let inner = Arc::clone(&self);
            let worker_task = task.clone();
            let handle = tokio::spawn(async move {
                inner.run_task(worker_task, permit).await;
            });
            handles.push((task, handle));
        }

        for (task, handle) in handles {
            if let Err(e) = handle.await {
                error!(task_id = %task.id(), error = %e, "Worker panicked");
                let result = TaskResult::failed(
                    &task,
                    FailureKind::Io,
                    format!("worker panicked: {}", e),
                    Duration::ZERO,
                );
                self.finish_task(result, Some(&task)).await;
            }
        }

        self.finish_batch().await;
    }

    async fn mark_running(&self, task_id: TaskId) {
        {
            let mut shared = self.shared.lock().await;
            shared.state.in_flight.insert(task_id, 0.0);
            shared.state.refresh_progress();
        }
        self.reporter.on_task_started(task_id);
    }

    /// Runs one task on a worker: convert, then copy tags.
    async fn run_task(&self, task: TaskDescriptor, _permit: OwnedSemaphorePermit) {
        let start = Instant::now();
        let active = metrics::GaugeGuard::new(&metrics::ACTIVE_WORKERS);
        info!(task_id = %task.id(), source = %task.display_name(), bitrate = %task.bitrate(), "Converting");

        let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
        let convert = self.converter.convert(&task, progress_tx, &self.cancel);
        let forward = async {
            while let Some(progress) = progress_rx.recv().await {
                self.record_progress(task.id(), progress.fraction).await;
            }
        };
        // The converter drops its sender when done, which ends `forward`
        let (outcome, ()) = tokio::join!(convert, forward);

        let result = match outcome {
            Ok(mut result) => {
                if task.preserve_metadata() {
                    self.transfer_metadata(&task, &mut result).await;
                }
                result.elapsed_ms = start.elapsed().as_millis() as u64;
                result
            }
            Err(ConversionError::Cancelled) => {
                TaskResult::cancelled(&task, self.cancel_detail().await, start.elapsed())
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(task_id = %task.id(), error = %e, "Backend unusable, aborting batch");
                    self.mark_aborted().await;
                }
                TaskResult::failed(
                    &task,
                    e.failure_kind().unwrap_or(FailureKind::Io),
                    e.detail(),
                    start.elapsed(),
                )
            }
        };

        drop(active);
        self.finish_task(result, Some(&task)).await;
    }

    async fn transfer_metadata(&self, task: &TaskDescriptor, result: &mut TaskResult) {
        let options = MetadataOptions {
            extract_cover: task.extract_cover(),
        };

        match self
            .metadata
            .transfer(task.source_path(), task.output_path(), &options)
            .await
        {
            Ok(report) => {
                debug!(
                    task_id = %task.id(),
                    tags = report.tags.len(),
                    cover = report.cover_embedded,
                    "Metadata transferred"
                );
                if !report.is_noop() {
                    if let Ok(meta) = tokio::fs::metadata(task.output_path()).await {
                        result.output_size_bytes = Some(meta.len());
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %task.id(), error = %e, "Metadata transfer failed, keeping audio");
                metrics::METADATA_FAILURES.inc();
                result.metadata_warning = Some(e.to_string());
            }
        }
    }

    async fn record_progress(&self, task_id: TaskId, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        {
            let mut shared = self.shared.lock().await;
            if let Some(current) = shared.state.in_flight.get_mut(&task_id) {
                *current = current.max(fraction);
            }
            shared.state.refresh_progress();
        }
        self.reporter.on_task_progress(task_id, fraction);
    }

    /// Cancels a task that never reached a worker.
    async fn finish_unstarted(&self, task: &TaskDescriptor) {
        let detail = self.cancel_detail().await;
        debug!(task_id = %task.id(), detail, "Task cancelled before start");
        self.finish_task(TaskResult::cancelled(task, detail, Duration::ZERO), Some(task))
            .await;
    }

    async fn finish_task(&self, result: TaskResult, task: Option<&TaskDescriptor>) {
        let task_id = result.task_id;
        {
            let mut shared = self.shared.lock().await;
            if shared.results.contains_key(&task_id) {
                return;
            }
            shared.state.in_flight.remove(&task_id);
            shared.state.record_terminal(result.status);
            shared.state.refresh_progress();
            shared.results.insert(task_id, result.clone());
        }

        metrics::record_task_result(&result, task.map(|t| t.bitrate().kbps()));
        self.reporter.on_task_finished(task_id, &result);
    }

    async fn finish_batch(&self) {
        let state = {
            let mut shared = self.shared.lock().await;
            shared.state.status = if shared.aborted {
                BatchStatus::Aborted
            } else {
                BatchStatus::Completed
            };
            shared.state.in_flight.clear();
            shared.state.refresh_progress();
            shared.state.clone()
        };

        metrics::BATCHES_TOTAL
            .with_label_values(&[state.status.as_str()])
            .inc();
        self.reporter.on_batch_finished(&state);
        // Stores the value even when nobody is subscribed yet
        self.done_tx.send_replace(true);
    }
}

/// Identity of an output file that does not exist yet.
///
/// The parent directory is canonicalized when it exists, so `out/a.mp3`
/// and `./out/a.mp3` claim the same file.
fn output_key(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|dir| dir.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::NoopReporter;
    use crate::testing::{MockConverter, MockFailure, MockMetadataTransfer};
    use crate::task::TaskStatus;
    use tempfile::TempDir;

    fn coordinator(
        converter: MockConverter,
    ) -> BatchCoordinator<MockConverter, MockMetadataTransfer> {
        BatchCoordinator::new(converter, MockMetadataTransfer::new(), Arc::new(NoopReporter))
    }

    fn request(dir: &TempDir, name: &str) -> TaskRequest {
        let source = dir.path().join(format!("{name}.mp4"));
        std::fs::write(&source, b"video").unwrap();
        TaskRequest::new(source, dir.path().join("out").join(format!("{name}.mp3")))
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let batch = coordinator(MockConverter::new());
        batch.start(None).await.unwrap();
        let state = batch.wait().await;

        assert_eq!(state.status, BatchStatus::Completed);
        assert_eq!(state.total_tasks, 0);
        assert_eq!(state.overall_progress, 1.0);
    }

    #[tokio::test]
    async fn test_ids_follow_enqueue_order() {
        let dir = TempDir::new().unwrap();
        let batch = coordinator(MockConverter::new());
        let ids = batch
            .enqueue([request(&dir, "a"), request(&dir, "b")])
            .await
            .unwrap();
        let more = batch.enqueue([request(&dir, "c")]).await.unwrap();

        assert_eq!(ids, vec![TaskId(1), TaskId(2)]);
        assert_eq!(more, vec![TaskId(3)]);
        assert_eq!(batch.snapshot().await.total_tasks, 3);
    }

    #[tokio::test]
    async fn test_enqueue_after_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let batch = coordinator(MockConverter::new());
        batch.enqueue([request(&dir, "a")]).await.unwrap();
        batch.start(Some(1)).await.unwrap();

        let err = batch.enqueue([request(&dir, "b")]).await.unwrap_err();
        assert!(matches!(err, BatchError::NotIdle(_)));
        assert!(matches!(
            batch.start(Some(1)).await.unwrap_err(),
            BatchError::NotIdle(_)
        ));

        batch.wait().await;
    }

    #[tokio::test]
    async fn test_wait_after_completion_returns() {
        let dir = TempDir::new().unwrap();
        let batch = coordinator(MockConverter::new());
        batch.enqueue([request(&dir, "a")]).await.unwrap();
        batch.start(Some(1)).await.unwrap();

        // Let the batch finish before anyone waits on it
        for _ in 0..200 {
            if batch.snapshot().await.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let state = tokio::time::timeout(Duration::from_secs(3), batch.wait())
            .await
            .expect("wait hung after completion");
        assert_eq!(state.status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_wait_after_preflight_abort_returns() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_validate_failure(Some(MockFailure::ToolMissing)).await;
        let batch = coordinator(converter);
        batch.enqueue([request(&dir, "a")]).await.unwrap();

        assert!(matches!(
            batch.start(None).await.unwrap_err(),
            BatchError::ExternalToolMissing(_)
        ));

        let state = tokio::time::timeout(Duration::from_secs(3), batch.wait())
            .await
            .expect("wait hung after abort");
        assert_eq!(state.status, BatchStatus::Aborted);
        assert_eq!(state.cancelled_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_output_is_skipped() {
        let dir = TempDir::new().unwrap();
        let first = request(&dir, "talk");
        let source = dir.path().join("talk.mkv");
        std::fs::write(&source, b"video").unwrap();
        let second = TaskRequest::new(source, dir.path().join("out/./talk.mp3"));

        let converter = MockConverter::new();
        let batch = coordinator(converter.clone());
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        batch.enqueue([first, second]).await.unwrap();
        batch.start(Some(2)).await.unwrap();
        let state = batch.wait().await;

        assert_eq!(state.completed_count, 1);
        assert_eq!(state.skipped_count, 1);
        let results = batch.results().await;
        assert_eq!(results[1].status, TaskStatus::Skipped);
        assert!(results[1]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("already claimed"));
        assert_eq!(converter.conversion_count().await, 1);
    }

    #[test]
    fn test_output_key_resolves_parent() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("a.mp3");
        let dotted = dir.path().join(".").join("a.mp3");
        assert_eq!(output_key(&plain), output_key(&dotted));
        assert_ne!(output_key(&plain), output_key(&dir.path().join("b.mp3")));
    }

    #[tokio::test]
    async fn test_wait_before_start_returns_idle() {
        let batch = coordinator(MockConverter::new());
        assert_eq!(batch.wait().await.status, BatchStatus::Idle);
    }

    #[tokio::test]
    async fn test_metadata_failure_keeps_success() {
        let dir = TempDir::new().unwrap();
        let metadata = MockMetadataTransfer::new();
        metadata.fail_with("tag writer exploded").await;
        let batch = BatchCoordinator::new(MockConverter::new(), metadata, Arc::new(NoopReporter));

        batch.enqueue([request(&dir, "a")]).await.unwrap();
        batch.start(Some(1)).await.unwrap();
        let state = batch.wait().await;

        let results = batch.results().await;
        assert_eq!(state.completed_count, 1);
        assert_eq!(results[0].status, TaskStatus::Succeeded);
        assert!(results[0]
            .metadata_warning
            .as_deref()
            .unwrap()
            .contains("tag writer exploded"));
        assert!(dir.path().join("out/a.mp3").exists());
    }

    #[tokio::test]
    async fn test_metadata_skipped_when_not_preserved() {
        let dir = TempDir::new().unwrap();
        let metadata = MockMetadataTransfer::new();
        let batch =
            BatchCoordinator::new(MockConverter::new(), metadata.clone(), Arc::new(NoopReporter));

        batch
            .enqueue([request(&dir, "a").with_metadata(false), request(&dir, "b")])
            .await
            .unwrap();
        batch.start(Some(2)).await.unwrap();
        batch.wait().await;

        let transfers = metadata.recorded_transfers().await;
        assert_eq!(transfers.len(), 1);
        assert!(transfers[0].0.ends_with("b.mp4"));
    }
}
