//! Error types for the batch module.

use thiserror::Error;

use super::types::BatchStatus;
use crate::converter::ConversionError;

/// Errors returned by batch operations.
///
/// Per-task failures never show up here; they are recorded in each
/// task's result.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Tasks can only be added, and the batch started, while idle.
    #[error("Batch is {0}, expected idle")]
    NotIdle(BatchStatus),

    /// The conversion backend failed its preflight check.
    #[error("Conversion backend unavailable: {0}")]
    ExternalToolMissing(#[source] ConversionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            BatchError::NotIdle(BatchStatus::Running).to_string(),
            "Batch is running, expected idle"
        );
        let err = BatchError::ExternalToolMissing(ConversionError::tool_missing(
            "ffmpeg",
            "ffmpeg",
            "binary not found",
        ));
        assert!(err.to_string().contains("ffmpeg is not usable"));
    }
}
