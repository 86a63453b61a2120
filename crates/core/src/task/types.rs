//! Types for conversion tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::InvalidTaskError;

/// Bitrates accepted for MP3 output, in kbps.
pub const ALLOWED_BITRATES: [u32; 4] = [128, 192, 256, 320];

/// Identifier of a task within a batch, assigned in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Target MP3 bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Bitrate {
    Kbps128,
    #[default]
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Bitrate {
    /// Returns the bitrate in kbps.
    pub fn kbps(self) -> u32 {
        match self {
            Self::Kbps128 => 128,
            Self::Kbps192 => 192,
            Self::Kbps256 => 256,
            Self::Kbps320 => 320,
        }
    }

    /// Returns the value for ffmpeg's `-b:a` option.
    pub fn ffmpeg_arg(self) -> String {
        format!("{}k", self.kbps())
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = InvalidTaskError;

    fn try_from(kbps: u32) -> Result<Self, Self::Error> {
        match kbps {
            128 => Ok(Self::Kbps128),
            192 => Ok(Self::Kbps192),
            256 => Ok(Self::Kbps256),
            320 => Ok(Self::Kbps320),
            _ => Err(InvalidTaskError::UnsupportedBitrate { kbps }),
        }
    }
}

impl From<Bitrate> for u32 {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.kbps()
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kbps", self.kbps())
    }
}

/// A conversion as requested by the caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Video file to read.
    pub source_path: PathBuf,
    /// MP3 file to write.
    pub output_path: PathBuf,
    /// Requested bitrate in kbps.
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    /// Apply loudness normalization.
    #[serde(default)]
    pub normalize: bool,
    /// Copy container tags into the MP3.
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,
    /// Embed the source's cover picture (only when tags are preserved).
    #[serde(default = "default_true")]
    pub extract_cover: bool,
    /// Replace an existing output file.
    #[serde(default)]
    pub overwrite: bool,
}

fn default_bitrate_kbps() -> u32 {
    Bitrate::default().kbps()
}

fn default_true() -> bool {
    true
}

impl TaskRequest {
    /// Creates a request with default options.
    pub fn new(source_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: output_path.into(),
            bitrate_kbps: Bitrate::default().kbps(),
            normalize: false,
            preserve_metadata: true,
            extract_cover: true,
            overwrite: false,
        }
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_metadata(mut self, preserve: bool) -> Self {
        self.preserve_metadata = preserve;
        self
    }

    pub fn with_cover(mut self, extract: bool) -> Self {
        self.extract_cover = extract;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// A validated, immutable conversion task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    id: TaskId,
    source_path: PathBuf,
    output_path: PathBuf,
    bitrate: Bitrate,
    normalize: bool,
    preserve_metadata: bool,
    extract_cover: bool,
}

impl TaskDescriptor {
    /// Validates a request against the filesystem and builds the descriptor.
    pub fn new(id: TaskId, request: TaskRequest) -> Result<Self, InvalidTaskError> {
        let bitrate = Bitrate::try_from(request.bitrate_kbps)?;
        validate_source(&request.source_path)?;
        validate_output(&request.source_path, &request.output_path, request.overwrite)?;

        Ok(Self {
            id,
            source_path: request.source_path,
            output_path: request.output_path,
            bitrate,
            normalize: request.normalize,
            preserve_metadata: request.preserve_metadata,
            extract_cover: request.extract_cover,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn preserve_metadata(&self) -> bool {
        self.preserve_metadata
    }

    pub fn extract_cover(&self) -> bool {
        self.extract_cover
    }

    /// File name of the source, for log lines.
    pub fn display_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

fn validate_source(path: &Path) -> Result<(), InvalidTaskError> {
    let meta = fs::metadata(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            InvalidTaskError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            InvalidTaskError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        }
    })?;

    if !meta.is_file() {
        return Err(InvalidTaskError::SourceNotAFile {
            path: path.to_path_buf(),
        });
    }

    File::open(path).map_err(|e| InvalidTaskError::SourceUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(())
}

fn validate_output(source: &Path, output: &Path, overwrite: bool) -> Result<(), InvalidTaskError> {
    let same = match (source.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => source == output,
    };
    if same {
        return Err(InvalidTaskError::OutputSameAsSource {
            path: output.to_path_buf(),
        });
    }

    if output.is_dir() {
        return Err(InvalidTaskError::output_not_writable(output, "path is a directory"));
    }
    if output.exists() && !overwrite {
        return Err(InvalidTaskError::OutputExists {
            path: output.to_path_buf(),
        });
    }

    // The parent may not exist yet; the converter creates it. Check the
    // nearest ancestor that does exist instead.
    let mut candidate = output.parent().unwrap_or(Path::new("."));
    loop {
        if candidate.as_os_str().is_empty() {
            candidate = Path::new(".");
            break;
        }
        if candidate.exists() {
            break;
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => {
                candidate = Path::new(".");
                break;
            }
        }
    }

    let meta = fs::metadata(candidate)
        .map_err(|e| InvalidTaskError::output_not_writable(output, e.to_string()))?;
    if !meta.is_dir() {
        return Err(InvalidTaskError::output_not_writable(
            output,
            format!("{} is not a directory", candidate.display()),
        ));
    }
    if meta.permissions().readonly() {
        return Err(InvalidTaskError::output_not_writable(
            output,
            format!("{} is read-only", candidate.display()),
        ));
    }

    Ok(())
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidTask,
    SourceUnreadable,
    EncodeFailure,
    DiskFull,
    ExternalToolMissing,
    Timeout,
    Io,
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task the result belongs to.
    pub task_id: TaskId,
    /// Terminal status.
    pub status: TaskStatus,
    /// Source file of the task.
    pub source_path: PathBuf,
    /// Written MP3 file (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Size of the written MP3 in bytes (success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,
    /// Failure classification for failed and skipped tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Human-readable reason for anything but success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Tagging problem on an otherwise successful conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_warning: Option<String>,
    /// Wall time spent on the task in milliseconds.
    pub elapsed_ms: u64,
    /// When the task reached its terminal state.
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    /// A successful conversion of `task`.
    pub fn succeeded(task: &TaskDescriptor, output_size_bytes: u64, elapsed: Duration) -> Self {
        Self {
            task_id: task.id(),
            status: TaskStatus::Succeeded,
            source_path: task.source_path().to_path_buf(),
            output_path: Some(task.output_path().to_path_buf()),
            output_size_bytes: Some(output_size_bytes),
            failure: None,
            error_detail: None,
            metadata_warning: None,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// A task that ran and failed.
    pub fn failed(
        task: &TaskDescriptor,
        failure: FailureKind,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            task_id: task.id(),
            status: TaskStatus::Failed,
            source_path: task.source_path().to_path_buf(),
            output_path: None,
            output_size_bytes: None,
            failure: Some(failure),
            error_detail: Some(detail.into()),
            metadata_warning: None,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// A request rejected at validation time.
    pub fn skipped(task_id: TaskId, source_path: impl Into<PathBuf>, error: &InvalidTaskError) -> Self {
        Self {
            task_id,
            status: TaskStatus::Skipped,
            source_path: source_path.into(),
            output_path: None,
            output_size_bytes: None,
            failure: Some(FailureKind::InvalidTask),
            error_detail: Some(error.to_string()),
            metadata_warning: None,
            elapsed_ms: 0,
            finished_at: Utc::now(),
        }
    }

    /// A task stopped by cancellation, either in flight or before it started.
    pub fn cancelled(task: &TaskDescriptor, detail: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            task_id: task.id(),
            status: TaskStatus::Cancelled,
            source_path: task.source_path().to_path_buf(),
            output_path: None,
            output_size_bytes: None,
            failure: None,
            error_detail: Some(detail.into()),
            metadata_warning: None,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// Wall time spent on the task.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}
