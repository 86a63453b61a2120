//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the FFmpeg-based converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Timeout for a single conversion in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Ask ffmpeg for bit-exact output (no encoder version strings).
    #[serde(default = "default_bitexact")]
    pub bitexact: bool,

    /// Integrated loudness target for normalization, in LUFS.
    #[serde(default = "default_loudness_target")]
    pub loudness_target_lufs: f32,

    /// True-peak ceiling for normalization, in dBTP.
    #[serde(default = "default_true_peak")]
    pub true_peak_db: f32,

    /// Minimum interval between progress updates in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Additional ffmpeg output arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_bitexact() -> bool {
    true
}

fn default_loudness_target() -> f32 {
    -16.0
}

fn default_true_peak() -> f32 {
    -1.0
}

fn default_progress_interval() -> u64 {
    250
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout(),
            ffmpeg_log_level: default_log_level(),
            bitexact: default_bitexact(),
            loudness_target_lufs: default_loudness_target(),
            true_peak_db: default_true_peak(),
            progress_interval_ms: default_progress_interval(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl ConverterConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Returns the ffmpeg audio filter used when normalization is on.
    pub fn loudnorm_filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA=11",
            self.loudness_target_lufs, self.true_peak_db
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.timeout_secs, 3600);
        assert!(config.bitexact);
    }

    #[test]
    fn test_config_builder() {
        let config = ConverterConfig::with_paths(
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffprobe"),
        )
        .with_timeout(7200);

        assert_eq!(config.ffmpeg_path, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("/usr/local/bin/ffprobe"));
        assert_eq!(config.timeout_secs, 7200);
    }

    #[test]
    fn test_loudnorm_filter() {
        let config = ConverterConfig::default();
        assert_eq!(config.loudnorm_filter(), "loudnorm=I=-16:TP=-1:LRA=11");
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let parsed: ConverterConfig = serde_json::from_str(r#"{"timeout_secs": 60}"#).unwrap();
        assert_eq!(parsed.timeout_secs, 60);
        assert_eq!(parsed.ffmpeg_log_level, "error");
        assert_eq!(parsed.progress_interval_ms, 250);
    }
}
