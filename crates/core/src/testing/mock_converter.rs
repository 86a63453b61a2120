//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

use crate::converter::{ConversionError, ConversionProgress, Converter, MediaInfo};
use crate::task::{Bitrate, CancelFlag, TaskDescriptor, TaskId, TaskResult};

/// Failure the mock can be told to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Unreadable or corrupt input.
    EncodeFailure(String),
    SourceUnreadable,
    DiskFull,
    /// Backend not installed.
    ToolMissing,
}

impl MockFailure {
    fn into_error(self, task: Option<&TaskDescriptor>) -> ConversionError {
        let source = task.map(|t| t.source_path().to_path_buf()).unwrap_or_default();
        let output = task.map(|t| t.output_path().to_path_buf()).unwrap_or_default();
        match self {
            Self::EncodeFailure(stderr) => ConversionError::encode_failure(
                "FFmpeg exited with code: Some(1)",
                Some(stderr),
            ),
            Self::SourceUnreadable => ConversionError::SourceUnreadable {
                path: source,
                reason: "Permission denied".to_string(),
            },
            Self::DiskFull => ConversionError::DiskFull { path: output },
            Self::ToolMissing => {
                ConversionError::tool_missing("ffmpeg", "ffmpeg", "binary not found")
            }
        }
    }
}

/// A recorded conversion for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    pub task_id: TaskId,
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub bitrate: Bitrate,
    pub normalize: bool,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track conversions for assertions
/// - Simulate failures per source file name
/// - Simulate a missing backend in `validate`
/// - Simulate progress updates and conversion time
/// - Honour cancellation between progress steps
///
/// Successful conversions write a small deterministic output file, so
/// tests can check what ends up on disk.
///
/// # Example
///
/// ```rust,ignore
/// use vidtune_core::testing::{MockConverter, MockFailure};
///
/// let converter = MockConverter::new();
/// converter.fail_source("broken.mp4", MockFailure::EncodeFailure("moov atom not found".into())).await;
///
/// // ... run a batch ...
///
/// let conversions = converter.recorded_conversions().await;
/// assert_eq!(conversions.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    /// Recorded conversions.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// Failures keyed by source file name.
    failures: Arc<RwLock<HashMap<String, MockFailure>>>,
    /// If set, `validate` fails with this.
    validate_failure: Arc<RwLock<Option<MockFailure>>>,
    /// Simulated conversion duration in milliseconds.
    conversion_duration_ms: Arc<RwLock<u64>>,
    /// Number of progress updates per conversion.
    progress_steps: Arc<RwLock<u32>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            validate_failure: Arc::new(RwLock::new(None)),
            conversion_duration_ms: Arc::new(RwLock::new(20)),
            progress_steps: Arc::new(RwLock::new(5)),
        }
    }

    /// Get all recorded conversions.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of conversions attempted.
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Make conversions of the file named `file_name` fail.
    pub async fn fail_source(&self, file_name: impl Into<String>, failure: MockFailure) {
        self.failures.write().await.insert(file_name.into(), failure);
    }

    /// Make `validate` fail.
    pub async fn set_validate_failure(&self, failure: Option<MockFailure>) {
        *self.validate_failure.write().await = failure;
    }

    /// Set the simulated conversion duration.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        *self.conversion_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Set how many progress updates each conversion sends (0 for none).
    pub async fn set_progress_steps(&self, steps: u32) {
        *self.progress_steps.write().await = steps;
    }

    /// Bytes written for a successful conversion.
    pub fn expected_output(task: &TaskDescriptor) -> Vec<u8> {
        format!(
            "MOCK-MP3 {} {} normalize={}",
            task.display_name(),
            task.bitrate().kbps(),
            task.normalize()
        )
        .into_bytes()
    }

    async fn record(&self, task: &TaskDescriptor, success: bool) {
        self.conversions.write().await.push(RecordedConversion {
            task_id: task.id(),
            source_path: task.source_path().to_path_buf(),
            output_path: task.output_path().to_path_buf(),
            bitrate: task.bitrate(),
            normalize: task.normalize(),
            success,
        });
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConversionError> {
        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes: 10 * 1024 * 1024, // 10 MB
            duration_secs: 180.0,
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
            audio_codec: Some("aac".to_string()),
            audio_bitrate_kbps: Some(192),
            audio_sample_rate: Some(48000),
            audio_channels: Some(2),
            video_codec: Some("h264".to_string()),
            video_width: Some(1280),
            video_height: Some(720),
            ..Default::default()
        })
    }

    async fn convert(
        &self,
        task: &TaskDescriptor,
        progress_tx: mpsc::Sender<ConversionProgress>,
        cancel: &CancelFlag,
    ) -> Result<TaskResult, ConversionError> {
        let start = Instant::now();
        let file_name = task.display_name();

        if let Some(failure) = self.failures.read().await.get(&file_name).cloned() {
            self.record(task, false).await;
            return Err(failure.into_error(Some(task)));
        }

        let duration_ms = *self.conversion_duration_ms.read().await;
        let steps = *self.progress_steps.read().await;
        let step_duration = Duration::from_millis(duration_ms / u64::from(steps.max(1)));

        for i in 0..steps.max(1) {
            if cancel.is_cancelled() {
                self.record(task, false).await;
                return Err(ConversionError::Cancelled);
            }

            tokio::time::sleep(step_duration).await;

            if steps > 0 {
                let fraction = (i + 1) as f32 / steps as f32;
                let _ = progress_tx
                    .send(ConversionProgress {
                        task_id: task.id(),
                        fraction,
                        time_secs: 180.0 * fraction as f64,
                        duration_secs: Some(180.0),
                        speed: Some("10x".to_string()),
                    })
                    .await;
            }
        }

        if cancel.is_cancelled() {
            self.record(task, false).await;
            return Err(ConversionError::Cancelled);
        }

        if let Some(parent) = task.output_path().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConversionError::from_write_error(e, parent))?;
        }
        let bytes = Self::expected_output(task);
        tokio::fs::write(task.output_path(), &bytes)
            .await
            .map_err(|e| ConversionError::from_write_error(e, task.output_path()))?;

        self.record(task, true).await;
        Ok(TaskResult::succeeded(task, bytes.len() as u64, start.elapsed()))
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        match self.validate_failure.read().await.clone() {
            Some(failure) => Err(failure.into_error(None)),
            None => Ok(()),
        }
    }
}
