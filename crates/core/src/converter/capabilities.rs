//! Encoder capability detection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::process::Stdio;
use tokio::process::Command;

use super::config::ConverterConfig;
use super::error::ConversionError;

/// Encoder used for MP3 output.
pub const MP3_ENCODER: &str = "libmp3lame";

/// Audio encoders compiled into the installed ffmpeg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    /// Names of available audio encoders.
    pub audio_encoders: BTreeSet<String>,
}

impl EncoderCapabilities {
    /// Detect available encoders by running `ffmpeg -encoders`.
    pub async fn detect(config: &ConverterConfig) -> Result<Self, ConversionError> {
        let output = Command::new(&config.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConversionError::tool_missing("ffmpeg", &config.ffmpeg_path, "binary not found")
                } else {
                    ConversionError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ConversionError::tool_missing(
                "ffmpeg",
                &config.ffmpeg_path,
                format!("`-encoders` exited with {:?}", output.status.code()),
            ));
        }

        Ok(Self::from_encoder_list(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    /// Parses the table printed by `ffmpeg -encoders`.
    ///
    /// Rows look like ` A....D libmp3lame  libmp3lame MP3 (MPEG audio layer 3)`;
    /// everything before the `------` separator is legend.
    pub fn from_encoder_list(stdout: &str) -> Self {
        let audio_encoders = stdout
            .lines()
            .skip_while(|line| !line.trim_start().starts_with("---"))
            .skip(1)
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let flags = parts.next()?;
                let name = parts.next()?;
                flags.starts_with('A').then(|| name.to_string())
            })
            .collect();

        Self { audio_encoders }
    }

    /// Check whether an audio encoder is available.
    pub fn supports(&self, encoder: &str) -> bool {
        self.audio_encoders.contains(encoder)
    }

    /// Check whether MP3 output is possible.
    pub fn has_mp3_encoder(&self) -> bool {
        self.supports(MP3_ENCODER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 .F.... = Frame-level multithreading
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libmp3lame           libmp3lame MP3 (MPEG audio layer 3) (codec mp3)
 S..... srt                  SubRip subtitle
";

    #[test]
    fn test_default_capabilities() {
        let caps = EncoderCapabilities::default();
        assert!(!caps.has_mp3_encoder());
    }

    #[test]
    fn test_parse_encoder_list() {
        let caps = EncoderCapabilities::from_encoder_list(SAMPLE);
        assert!(caps.has_mp3_encoder());
        assert!(caps.supports("aac"));
        // legend rows and video encoders are not audio encoders
        assert!(!caps.supports("libx264"));
        assert!(!caps.supports("="));
        assert_eq!(caps.audio_encoders.len(), 2);
    }

    #[test]
    fn test_parse_without_lame() {
        let stdout = " ------\n A....D aac   AAC\n";
        let caps = EncoderCapabilities::from_encoder_list(stdout);
        assert!(!caps.has_mp3_encoder());
        assert!(caps.supports("aac"));
    }
}
