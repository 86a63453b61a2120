//! Error types for the metadata module.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while copying tags and cover art.
///
/// None of these fail a task: the converted audio is kept and the
/// message is attached to the result as a warning.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// ffmpeg or ffprobe could not be started.
    #[error("{tool} not found at {path}")]
    ToolMissing { tool: String, path: PathBuf },

    /// Source tags could not be read.
    #[error("Failed to read source tags: {reason}")]
    ProbeFailed { reason: String },

    /// Cover picture could not be extracted from the source.
    #[error("Failed to extract cover art: {reason}")]
    CoverExtraction { reason: String },

    /// Tagged copy of the output could not be written.
    #[error("Failed to write tags: {reason}")]
    WriteFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Tagging took longer than the converter timeout.
    #[error("Tagging timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while moving files around.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MetadataError {
    /// Creates a write failure with captured stderr.
    pub fn write_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
            stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = MetadataError::write_failed("ffmpeg exited with code: Some(1)", None);
        assert_eq!(err.to_string(), "Failed to write tags: ffmpeg exited with code: Some(1)");

        let err = MetadataError::ToolMissing {
            tool: "ffprobe".to_string(),
            path: PathBuf::from("/opt/ffprobe"),
        };
        assert_eq!(err.to_string(), "ffprobe not found at /opt/ffprobe");
    }
}
