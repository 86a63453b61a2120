//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::task::TaskId;

/// Video container extensions accepted as conversion sources.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["mp4", "m4v", "avi", "mov", "wmv", "flv", "mkv", "webm"];

/// Extension of every produced file.
pub const OUTPUT_EXTENSION: &str = "mp3";

/// Information about a media file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    /// File path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Container format (e.g., "mov", "matroska").
    pub format: String,
    /// Audio codec (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Audio bitrate in kbps (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate_kbps: Option<u32>,
    /// Audio sample rate (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_sample_rate: Option<u32>,
    /// Audio channels (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channels: Option<u8>,
    /// Video codec (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Video width (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_width: Option<u32>,
    /// Video height (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_height: Option<u32>,
    /// Whether a video stream is flagged as an attached picture (cover art).
    #[serde(default)]
    pub has_attached_picture: bool,
    /// Container-level tags, keys lowercased.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl MediaInfo {
    /// Whether the file has any video stream, cover art included.
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    /// Whether the file carries an audio stream to convert.
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

/// Progress update during conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionProgress {
    /// Task being converted.
    pub task_id: TaskId,
    /// Completed fraction (0.0 - 1.0).
    pub fraction: f32,
    /// Current processing time in seconds.
    pub time_secs: f64,
    /// Total duration of the source in seconds, when known.
    pub duration_secs: Option<f64>,
    /// Current processing speed (e.g., "12.5x").
    pub speed: Option<String>,
}

impl ConversionProgress {
    /// Computes the fraction from processed and total seconds, clamped to 0..=1.
    pub fn fraction_of(time_secs: f64, duration_secs: Option<f64>) -> f32 {
        match duration_secs {
            Some(total) if total > 0.0 => (time_secs / total).clamp(0.0, 1.0) as f32,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_of() {
        assert_eq!(ConversionProgress::fraction_of(30.0, Some(60.0)), 0.5);
        assert_eq!(ConversionProgress::fraction_of(90.0, Some(60.0)), 1.0);
        assert_eq!(ConversionProgress::fraction_of(-1.0, Some(60.0)), 0.0);
        assert_eq!(ConversionProgress::fraction_of(10.0, None), 0.0);
        assert_eq!(ConversionProgress::fraction_of(10.0, Some(0.0)), 0.0);
    }

    #[test]
    fn test_media_info_streams() {
        let info = MediaInfo {
            audio_codec: Some("aac".to_string()),
            ..Default::default()
        };
        assert!(info.has_audio());
        assert!(!info.has_video());
    }

    #[test]
    fn test_supported_extensions_include_mp4() {
        assert!(SUPPORTED_INPUT_EXTENSIONS.contains(&"mp4"));
        assert!(SUPPORTED_INPUT_EXTENSIONS.contains(&"mkv"));
        assert!(!SUPPORTED_INPUT_EXTENSIONS.contains(&OUTPUT_EXTENSION));
    }
}
