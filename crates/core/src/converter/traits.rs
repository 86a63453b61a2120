//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::ConversionError;
use super::types::{ConversionProgress, MediaInfo, SUPPORTED_INPUT_EXTENSIONS};
use crate::task::{CancelFlag, TaskDescriptor, TaskResult};

/// A converter that turns one video file into one MP3 file.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Probes a media file to get its information.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConversionError>;

    /// Converts the task's source into its output file.
    ///
    /// Progress updates go to `progress_tx`; if the receiver is gone the
    /// conversion continues silently. `cancel` is checked between
    /// updates. On any error the partial output is removed.
    async fn convert(
        &self,
        task: &TaskDescriptor,
        progress_tx: mpsc::Sender<ConversionProgress>,
        cancel: &CancelFlag,
    ) -> Result<TaskResult, ConversionError>;

    /// Validates that the backend is installed and able to encode MP3.
    async fn validate(&self) -> Result<(), ConversionError>;

    /// Returns the supported input extensions.
    fn supported_input_formats(&self) -> &[&str] {
        SUPPORTED_INPUT_EXTENSIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskId, TaskRequest, TaskStatus};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    struct InstantConverter;

    #[async_trait]
    impl Converter for InstantConverter {
        fn name(&self) -> &str {
            "instant"
        }

        async fn probe(&self, path: &Path) -> Result<MediaInfo, ConversionError> {
            Ok(MediaInfo {
                path: path.to_path_buf(),
                duration_secs: 60.0,
                format: "mov".to_string(),
                ..Default::default()
            })
        }

        async fn convert(
            &self,
            task: &TaskDescriptor,
            progress_tx: mpsc::Sender<ConversionProgress>,
            _cancel: &CancelFlag,
        ) -> Result<TaskResult, ConversionError> {
            let _ = progress_tx
                .send(ConversionProgress {
                    task_id: task.id(),
                    fraction: 1.0,
                    time_secs: 60.0,
                    duration_secs: Some(60.0),
                    speed: None,
                })
                .await;
            Ok(TaskResult::succeeded(task, 1024, Duration::from_millis(5)))
        }

        async fn validate(&self) -> Result<(), ConversionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_convert_reports_progress_and_result() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.mp4");
        std::fs::write(&source, b"x").unwrap();
        let task =
            TaskDescriptor::new(TaskId(1), TaskRequest::new(&source, dir.path().join("a.mp3"))).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let result = InstantConverter
            .convert(&task, tx, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.output_size_bytes, Some(1024));
        assert_eq!(rx.recv().await.unwrap().fraction, 1.0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_probe() {
        let info = InstantConverter
            .probe(&PathBuf::from("/videos/a.mov"))
            .await
            .unwrap();
        assert_eq!(info.format, "mov");
        assert_eq!(info.duration_secs, 60.0);
    }

    #[test]
    fn test_supported_formats() {
        let formats = InstantConverter.supported_input_formats();
        assert!(formats.contains(&"mp4"));
        assert!(formats.contains(&"webm"));
    }
}
