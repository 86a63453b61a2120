//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the converter and
//! metadata traits plus a recording reporter, allowing batch behaviour to
//! be tested without an ffmpeg install.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vidtune_core::batch::BatchCoordinator;
//! use vidtune_core::testing::{MockConverter, MockMetadataTransfer, RecordingReporter};
//!
//! let reporter = Arc::new(RecordingReporter::new());
//! let batch = BatchCoordinator::new(MockConverter::new(), MockMetadataTransfer::new(), reporter.clone());
//! batch.enqueue(requests).await?;
//! batch.start(Some(2)).await?;
//! batch.wait().await;
//! assert_eq!(reporter.finished().len(), 3);
//! ```

mod mock_converter;
mod mock_metadata;
mod recording_reporter;

pub use mock_converter::{MockConverter, MockFailure, RecordedConversion};
pub use mock_metadata::{MockMetadataTransfer, RecordedTransfer};
pub use recording_reporter::RecordingReporter;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::task::TaskRequest;

    /// Writes a fake video file named `name` into `dir`.
    pub fn video_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, format!("fake video {name}"));
        path
    }

    /// A request converting a fresh fake `name` into `dir/out/<stem>.mp3`.
    pub fn request(dir: &Path, name: &str) -> TaskRequest {
        let source = video_file(dir, name);
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string());
        TaskRequest::new(source, dir.join("out").join(format!("{stem}.mp3")))
    }
}
