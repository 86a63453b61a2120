//! Validation errors for task descriptors.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a conversion request cannot become a task.
///
/// The batch coordinator never aborts on these: the request is recorded
/// as `Skipped` and the rest of the batch carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTaskError {
    /// Source file does not exist.
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Source path exists but is a directory or special file.
    #[error("Source is not a regular file: {path}")]
    SourceNotAFile { path: PathBuf },

    /// Source file exists but cannot be opened for reading.
    #[error("Source file is not readable: {path} ({reason})")]
    SourceUnreadable { path: PathBuf, reason: String },

    /// The output's directory is neither writable nor creatable.
    #[error("Output location is not writable: {path} ({reason})")]
    OutputNotWritable { path: PathBuf, reason: String },

    /// Output already exists and overwriting was not confirmed.
    #[error("Output file already exists: {path}")]
    OutputExists { path: PathBuf },

    /// Another task in the same batch already writes this output.
    #[error("Output file is already claimed by another task: {path}")]
    OutputConflict { path: PathBuf },

    /// Output would replace the source.
    #[error("Output path is the same as the source: {path}")]
    OutputSameAsSource { path: PathBuf },

    /// Bitrate outside the allowed set.
    #[error("Unsupported bitrate {kbps} kbps (allowed: 128, 192, 256, 320)")]
    UnsupportedBitrate { kbps: u32 },
}

impl InvalidTaskError {
    pub(crate) fn output_not_writable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::OutputNotWritable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
