//! Error types for the converter module.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::task::FailureKind;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// FFmpeg/FFprobe is absent or lacks the MP3 encoder. Fatal for a batch.
    #[error("{tool} is not usable at {path}: {reason}")]
    ExternalToolMissing {
        tool: String,
        path: PathBuf,
        reason: String,
    },

    /// Source file could not be opened or decoded from the start.
    #[error("Source file is unreadable: {path} ({reason})")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// FFmpeg ran but did not produce a valid output.
    #[error("Encoding failed: {reason}")]
    EncodeFailure {
        reason: String,
        stderr: Option<String>,
    },

    /// Output device ran out of space.
    #[error("Disk full while writing {path}")]
    DiskFull { path: PathBuf },

    /// Conversion timed out.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// Conversion was cancelled before it finished.
    #[error("Conversion cancelled")]
    Cancelled,

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConversionError {
    /// Creates an encode failure with captured stderr.
    pub fn encode_failure(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::EncodeFailure {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates an error for a missing or unsupported backend binary.
    pub fn tool_missing(tool: &str, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ExternalToolMissing {
            tool: tool.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps an I/O error while writing `path`, recognising a full disk.
    pub fn from_write_error(err: io::Error, path: &Path) -> Self {
        if err.kind() == io::ErrorKind::StorageFull {
            Self::DiskFull {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io(err)
        }
    }

    /// Whether this error must stop the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ExternalToolMissing { .. })
    }

    /// Classification stored in the task result. `None` for cancellation.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::ExternalToolMissing { .. } => Some(FailureKind::ExternalToolMissing),
            Self::SourceUnreadable { .. } => Some(FailureKind::SourceUnreadable),
            Self::EncodeFailure { .. } | Self::ProbeFailed { .. } => Some(FailureKind::EncodeFailure),
            Self::DiskFull { .. } => Some(FailureKind::DiskFull),
            Self::Timeout { .. } => Some(FailureKind::Timeout),
            Self::Io(_) => Some(FailureKind::Io),
            Self::Cancelled => None,
        }
    }

    /// Reason text including the first line of ffmpeg's stderr, if any.
    pub fn detail(&self) -> String {
        match self {
            Self::EncodeFailure {
                reason,
                stderr: Some(stderr),
            } => match stderr.lines().find(|l| !l.trim().is_empty()) {
                Some(first) => format!("Encoding failed: {} ({})", reason, first.trim()),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_tool_is_fatal() {
        assert!(ConversionError::tool_missing("ffmpeg", "ffmpeg", "not found").is_fatal());
        assert!(!ConversionError::encode_failure("bad", None).is_fatal());
        assert!(!ConversionError::DiskFull {
            path: PathBuf::from("/out.mp3")
        }
        .is_fatal());
        assert!(!ConversionError::Cancelled.is_fatal());
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            ConversionError::encode_failure("x", None).failure_kind(),
            Some(FailureKind::EncodeFailure)
        );
        assert_eq!(
            ConversionError::Timeout { timeout_secs: 5 }.failure_kind(),
            Some(FailureKind::Timeout)
        );
        assert_eq!(ConversionError::Cancelled.failure_kind(), None);
    }

    #[test]
    fn test_storage_full_becomes_disk_full() {
        let err = io::Error::new(io::ErrorKind::StorageFull, "no space");
        let mapped = ConversionError::from_write_error(err, Path::new("/out/a.mp3"));
        assert!(matches!(mapped, ConversionError::DiskFull { .. }));

        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let mapped = ConversionError::from_write_error(err, Path::new("/out/a.mp3"));
        assert!(matches!(mapped, ConversionError::Io(_)));
    }

    #[test]
    fn test_detail_includes_first_stderr_line() {
        let err = ConversionError::encode_failure(
            "FFmpeg exited with code: Some(1)",
            Some("\nclip.mp4: Invalid data found when processing input\n".to_string()),
        );
        let detail = err.detail();
        assert!(detail.contains("Invalid data found"));
        assert!(detail.starts_with("Encoding failed"));
    }
}
