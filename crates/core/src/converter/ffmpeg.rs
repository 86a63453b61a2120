//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::capabilities::{EncoderCapabilities, MP3_ENCODER};
use super::config::ConverterConfig;
use super::error::ConversionError;
use super::traits::Converter;
use super::types::{ConversionProgress, MediaInfo};
use crate::task::{CancelFlag, TaskDescriptor, TaskResult};

/// How often the cancellation flag is polled while ffmpeg is quiet.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum amount of ffmpeg diagnostics kept for error reports.
const STDERR_TAIL_LIMIT: usize = 4096;

/// How the ffmpeg child ended, short of a timeout.
enum Outcome {
    Exited(Option<i32>, String),
    Cancelled,
}

/// FFmpeg-based converter implementation.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Builds ffmpeg arguments for one task.
    ///
    /// Only the first audio stream is kept and all source metadata is
    /// dropped, so identical inputs and options give identical files.
    fn build_args(&self, task: &TaskDescriptor) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output, validated beforehand
            "-i".to_string(),
            task.source_path().to_string_lossy().to_string(),
        ];

        // Audio only
        args.extend([
            "-map".to_string(),
            "0:a:0".to_string(),
            "-vn".to_string(),
            "-sn".to_string(),
            "-dn".to_string(),
        ]);

        // Tags are written by the metadata transfer step
        args.extend(["-map_metadata".to_string(), "-1".to_string()]);

        args.extend([
            "-c:a".to_string(),
            MP3_ENCODER.to_string(),
            "-b:a".to_string(),
            task.bitrate().ffmpeg_arg(),
        ]);

        if task.normalize() {
            args.extend(["-af".to_string(), self.config.loudnorm_filter()]);
        }

        if self.config.bitexact {
            args.extend([
                "-fflags".to_string(),
                "+bitexact".to_string(),
                "-flags:a".to_string(),
                "+bitexact".to_string(),
            ]);
        }

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        // Extra args
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        // Output
        args.extend(["-f".to_string(), "mp3".to_string()]);
        args.push(task.output_path().to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, ConversionError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
            #[serde(default)]
            tags: HashMap<String, String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            bit_rate: Option<String>,
            sample_rate: Option<String>,
            channels: Option<u8>,
            width: Option<u32>,
            height: Option<u32>,
            #[serde(default)]
            disposition: ProbeDisposition,
        }

        #[derive(Deserialize, Default)]
        struct ProbeDisposition {
            #[serde(default)]
            attached_pic: u8,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            ConversionError::probe_failed(format!("Failed to parse ffprobe output: {}", e))
        })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");
        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
        let has_attached_picture = probe
            .streams
            .iter()
            .any(|s| s.codec_type == "video" && s.disposition.attached_pic == 1);

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        let tags = probe
            .format
            .tags
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();

        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
            format: format_name.to_string(),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            audio_bitrate_kbps: audio_stream
                .and_then(|s| s.bit_rate.as_ref())
                .and_then(|b| b.parse::<u32>().ok())
                .map(|b| b / 1000),
            audio_sample_rate: audio_stream
                .and_then(|s| s.sample_rate.as_ref())
                .and_then(|r| r.parse::<u32>().ok()),
            audio_channels: audio_stream.and_then(|s| s.channels),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            video_width: video_stream.and_then(|s| s.width),
            video_height: video_stream.and_then(|s| s.height),
            has_attached_picture,
            tags,
        })
    }

    /// Maps a non-zero ffmpeg exit to the matching error.
    fn classify_failure(
        source: &Path,
        output: &Path,
        code: Option<i32>,
        stderr: String,
    ) -> ConversionError {
        let lower = stderr.to_lowercase();
        if lower.contains("no space left on device") {
            return ConversionError::DiskFull {
                path: output.to_path_buf(),
            };
        }

        let source_str = source.to_string_lossy();
        let source_line = stderr
            .lines()
            .find(|l| l.contains(source_str.as_ref()) && l.to_lowercase().contains("permission denied"));
        if let Some(line) = source_line {
            return ConversionError::SourceUnreadable {
                path: source.to_path_buf(),
                reason: line.trim().to_string(),
            };
        }

        ConversionError::encode_failure(
            format!("FFmpeg exited with code: {:?}", code),
            if stderr.is_empty() { None } else { Some(stderr) },
        )
    }

    /// Runs the conversion, streaming progress and honouring cancellation.
    async fn run_conversion(
        &self,
        task: &TaskDescriptor,
        progress_tx: mpsc::Sender<ConversionProgress>,
        cancel: &CancelFlag,
    ) -> Result<TaskResult, ConversionError> {
        let start = Instant::now();
        let source = task.source_path();
        let output = task.output_path();

        tokio::fs::File::open(source)
            .await
            .map_err(|e| ConversionError::SourceUnreadable {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })?;

        // Ensure output directory exists
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConversionError::from_write_error(e, parent))?;
        }

        // Get input duration for progress calculation
        let duration_secs = match self.probe(source).await {
            Ok(info) => Some(info.duration_secs).filter(|d| *d > 0.0),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(task_id = %task.id(), error = %e, "Probe failed, progress unavailable");
                None
            }
        };

        let args = self.build_args(task);
        debug!(task_id = %task.id(), ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConversionError::tool_missing("ffmpeg", &self.config.ffmpeg_path, "binary not found")
                } else {
                    ConversionError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConversionError::encode_failure("ffmpeg stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let progress_line = Regex::new(r"^[a-z0-9_]+=").ok();
        let time_regex = Regex::new(r"^out_time_(?:ms|us)=(\d+)$").ok();
        let speed_regex = Regex::new(r"^speed=\s*(\d+\.?\d*)x").ok();

        let progress_interval = Duration::from_millis(self.config.progress_interval_ms);
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        let result = timeout(timeout_duration, async {
            let mut current_time = 0.0;
            let mut current_speed: Option<String> = None;
            let mut last_progress_send: Option<Instant> = None;
            let mut stderr_tail = String::new();
            let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);

            loop {
                tokio::select! {
                    line = reader.next_line() => {
                        let Some(line) = line? else { break };
                        let line = line.trim();

                        let is_progress = progress_line
                            .as_ref()
                            .is_some_and(|re| re.is_match(line));

                        if !is_progress {
                            // Anything else on stderr is a diagnostic
                            if !line.is_empty() && stderr_tail.len() < STDERR_TAIL_LIMIT {
                                stderr_tail.push_str(line);
                                stderr_tail.push('\n');
                            }
                        } else {
                            if let Some(caps) = time_regex.as_ref().and_then(|re| re.captures(line)) {
                                if let Ok(us) = caps[1].parse::<f64>() {
                                    current_time = us / 1_000_000.0; // Microseconds to seconds
                                }
                            }
                            if let Some(caps) = speed_regex.as_ref().and_then(|re| re.captures(line)) {
                                current_speed = Some(format!("{}x", &caps[1]));
                            }

                            let finished = line == "progress=end";
                            let due = last_progress_send
                                .is_none_or(|t| t.elapsed() >= progress_interval);
                            if finished || due {
                                let fraction = if finished {
                                    1.0
                                } else {
                                    ConversionProgress::fraction_of(current_time, duration_secs)
                                };
                                // Non-blocking send
                                let _ = progress_tx.try_send(ConversionProgress {
                                    task_id: task.id(),
                                    fraction,
                                    time_secs: current_time,
                                    duration_secs,
                                    speed: current_speed.clone(),
                                });
                                last_progress_send = Some(Instant::now());
                            }
                        }
                    }
                    _ = poll.tick() => {}
                }

                if cancel.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }
            }

            // Wait for process to complete
            let status = child.wait().await?;
            Ok::<Outcome, std::io::Error>(Outcome::Exited(status.code(), stderr_tail))
        })
        .await;

        let (code, stderr_tail) = match result {
            Ok(Ok(Outcome::Exited(code, stderr_tail))) => (code, stderr_tail),
            Ok(Ok(Outcome::Cancelled)) => {
                let _ = child.kill().await;
                remove_partial_output(output).await;
                return Err(ConversionError::Cancelled);
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                remove_partial_output(output).await;
                return Err(ConversionError::from_write_error(e, output));
            }
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                remove_partial_output(output).await;
                return Err(ConversionError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        if code != Some(0) {
            remove_partial_output(output).await;
            return Err(Self::classify_failure(source, output, code, stderr_tail));
        }

        // Verify output exists and get size
        let output_meta = tokio::fs::metadata(output)
            .await
            .map_err(|_| ConversionError::encode_failure("Output file not created", None))?;
        if output_meta.len() == 0 {
            remove_partial_output(output).await;
            return Err(ConversionError::encode_failure("Output file is empty", None));
        }

        Ok(TaskResult::succeeded(task, output_meta.len(), start.elapsed()))
    }
}

/// Deletes a partially written file, ignoring one that was never created.
pub(crate) async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConversionError> {
        if !path.exists() {
            return Err(ConversionError::SourceUnreadable {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConversionError::tool_missing("ffprobe", &self.config.ffprobe_path, "binary not found")
                } else {
                    ConversionError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ConversionError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn convert(
        &self,
        task: &TaskDescriptor,
        progress_tx: mpsc::Sender<ConversionProgress>,
        cancel: &CancelFlag,
    ) -> Result<TaskResult, ConversionError> {
        self.run_conversion(task, progress_tx, cancel).await
    }

    async fn validate(&self) -> Result<(), ConversionError> {
        // Check ffprobe exists
        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConversionError::tool_missing(
                    "ffprobe",
                    &self.config.ffprobe_path,
                    "binary not found",
                ));
            }
            return Err(ConversionError::Io(e));
        }

        // Checks ffmpeg exists as a side effect
        let capabilities = EncoderCapabilities::detect(&self.config).await?;
        if !capabilities.has_mp3_encoder() {
            return Err(ConversionError::tool_missing(
                "ffmpeg",
                &self.config.ffmpeg_path,
                format!("build has no {} encoder", MP3_ENCODER),
            ));
        }

        Ok(())
    }
}
