//! FFmpeg-based metadata transfer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::MetadataError;
use super::traits::MetadataTransfer;
use super::types::{MetadataOptions, SourceTags, TransferReport};
use crate::converter::{remove_partial_output, ConversionError, Converter, ConverterConfig, FfmpegConverter, MediaInfo};

/// Reads tags with ffprobe and rewrites the MP3 with an ffmpeg stream copy.
#[derive(Debug, Clone)]
pub struct FfmpegMetadataTransfer {
    prober: FfmpegConverter,
}

impl FfmpegMetadataTransfer {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            prober: FfmpegConverter::new(config),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    fn config(&self) -> &ConverterConfig {
        self.prober.config()
    }

    /// Sibling path used for the tagged copy before it replaces the output.
    fn temp_path(output: &Path) -> PathBuf {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output.mp3".to_string());
        output.with_file_name(format!(".{}.tagging.mp3", name))
    }

    /// Sibling path for the extracted cover picture.
    fn cover_path(output: &Path) -> PathBuf {
        let name = output
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        output.with_file_name(format!(".{}.cover.jpg", name))
    }

    /// Arguments grabbing one picture from the source.
    ///
    /// An attached picture is preferred; otherwise the first frame of the
    /// first real video stream is used.
    fn build_cover_args(&self, source: &Path, info: &MediaInfo, cover: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
        ];

        if info.has_attached_picture {
            // All video streams minus the non-picture ones
            args.extend([
                "-map".to_string(),
                "0:v".to_string(),
                "-map".to_string(),
                "-0:V".to_string(),
            ]);
        } else {
            args.extend(["-map".to_string(), "0:V:0".to_string()]);
        }

        args.extend([
            "-an".to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-c:v".to_string(),
            "mjpeg".to_string(),
            "-loglevel".to_string(),
            self.config().ffmpeg_log_level.clone(),
            "-f".to_string(),
            "image2".to_string(),
            cover.to_string_lossy().to_string(),
        ]);

        args
    }

    /// Arguments rewriting `output` into `temp` with tags and optional cover.
    fn build_tag_args(
        &self,
        output: &Path,
        tags: &SourceTags,
        cover: Option<&Path>,
        temp: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            output.to_string_lossy().to_string(),
        ];

        if let Some(cover_path) = cover {
            args.extend([
                "-i".to_string(),
                cover_path.to_string_lossy().to_string(),
                "-map".to_string(),
                "0:a".to_string(),
                "-map".to_string(),
                "1:v".to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                "-disposition:v:0".to_string(),
                "attached_pic".to_string(),
                "-metadata:s:v".to_string(),
                "title=Album cover".to_string(),
                "-metadata:s:v".to_string(),
                "comment=Cover (front)".to_string(),
            ]);
        } else {
            args.extend(["-map".to_string(), "0:a".to_string()]);
        }

        args.extend([
            "-c:a".to_string(),
            "copy".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-id3v2_version".to_string(),
            "3".to_string(),
        ]);

        args.extend(tags.to_ffmpeg_args());

        if self.config().bitexact {
            args.extend(["-fflags".to_string(), "+bitexact".to_string()]);
        }

        args.extend([
            "-loglevel".to_string(),
            self.config().ffmpeg_log_level.clone(),
            "-f".to_string(),
            "mp3".to_string(),
            temp.to_string_lossy().to_string(),
        ]);

        args
    }

    /// Runs ffmpeg to completion under the configured timeout.
    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), MetadataError> {
        debug!(?args, "Running ffmpeg for metadata");

        let mut command = Command::new(&self.config().ffmpeg_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout_secs = self.config().timeout_secs;
        let output = timeout(Duration::from_secs(timeout_secs), command.output())
            .await
            .map_err(|_| MetadataError::Timeout { timeout_secs })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MetadataError::ToolMissing {
                        tool: "ffmpeg".to_string(),
                        path: self.config().ffmpeg_path.clone(),
                    }
                } else {
                    MetadataError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(MetadataError::write_failed(
                format!("ffmpeg exited with code: {:?}", output.status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        Ok(())
    }

    async fn extract_cover(
        &self,
        source: &Path,
        info: &MediaInfo,
        cover: &Path,
    ) -> Result<(), MetadataError> {
        let args = self.build_cover_args(source, info, cover);
        self.run_ffmpeg(&args).await.map_err(|e| match e {
            MetadataError::WriteFailed { reason, stderr } => MetadataError::CoverExtraction {
                reason: match stderr {
                    Some(stderr) => format!("{} ({})", reason, stderr.lines().next().unwrap_or("")),
                    None => reason,
                },
            },
            other => other,
        })?;

        let written = tokio::fs::metadata(cover).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(MetadataError::CoverExtraction {
                reason: "no picture was written".to_string(),
            });
        }
        Ok(())
    }

    async fn write_tags(
        &self,
        source: &Path,
        output: &Path,
        options: &MetadataOptions,
        cover: &Path,
        temp: &Path,
    ) -> Result<TransferReport, MetadataError> {
        let info = self.prober.probe(source).await.map_err(|e| match e {
            ConversionError::ExternalToolMissing { tool, path, .. } => {
                MetadataError::ToolMissing { tool, path }
            }
            other => MetadataError::ProbeFailed {
                reason: other.to_string(),
            },
        })?;

        let tags = SourceTags::from_tags(&info.tags);
        let want_cover = options.extract_cover && info.has_video();

        if tags.is_empty() && !want_cover {
            debug!(source = %source.display(), "No tags or cover to transfer");
            return Ok(TransferReport::default());
        }

        if want_cover {
            self.extract_cover(source, &info, cover).await?;
        }

        let args = self.build_tag_args(output, &tags, want_cover.then_some(cover), temp);
        self.run_ffmpeg(&args).await?;
        tokio::fs::rename(temp, output).await?;

        Ok(TransferReport {
            tags,
            cover_embedded: want_cover,
        })
    }
}

#[async_trait]
impl MetadataTransfer for FfmpegMetadataTransfer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn transfer(
        &self,
        source_path: &Path,
        output_path: &Path,
        options: &MetadataOptions,
    ) -> Result<TransferReport, MetadataError> {
        let temp = Self::temp_path(output_path);
        let cover = Self::cover_path(output_path);

        let result = self
            .write_tags(source_path, output_path, options, &cover, &temp)
            .await;

        remove_partial_output(&cover).await;
        if result.is_err() {
            remove_partial_output(&temp).await;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transfer() -> FfmpegMetadataTransfer {
        FfmpegMetadataTransfer::with_defaults()
    }

    #[test]
    fn test_sibling_paths() {
        let output = Path::new("/music/talk.mp3");
        assert_eq!(
            FfmpegMetadataTransfer::temp_path(output),
            PathBuf::from("/music/.talk.mp3.tagging.mp3")
        );
        assert_eq!(
            FfmpegMetadataTransfer::cover_path(output),
            PathBuf::from("/music/.talk.cover.jpg")
        );
    }

    #[test]
    fn test_cover_args_prefer_attached_picture() {
        let info = MediaInfo {
            video_codec: Some("h264".to_string()),
            has_attached_picture: true,
            ..Default::default()
        };
        let args = transfer().build_cover_args(Path::new("a.mp4"), &info, Path::new("c.jpg"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "-0:V"));

        let info = MediaInfo {
            video_codec: Some("h264".to_string()),
            ..Default::default()
        };
        let args = transfer().build_cover_args(Path::new("a.mp4"), &info, Path::new("c.jpg"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:V:0"));
        assert!(args.windows(2).any(|w| w[0] == "-frames:v" && w[1] == "1"));
        assert_eq!(args.last().map(String::as_str), Some("c.jpg"));
    }

    #[test]
    fn test_tag_args_with_cover() {
        let tags = SourceTags {
            title: Some("Keynote".to_string()),
            ..Default::default()
        };
        let args = transfer().build_tag_args(
            Path::new("talk.mp3"),
            &tags,
            Some(Path::new("cover.jpg")),
            Path::new(".talk.mp3.tagging.mp3"),
        );

        assert!(args.windows(2).any(|w| w[0] == "-disposition:v:0" && w[1] == "attached_pic"));
        assert!(args.windows(2).any(|w| w[0] == "-id3v2_version" && w[1] == "3"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "copy"));
        assert!(args.contains(&"title=Keynote".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(".talk.mp3.tagging.mp3"));
    }

    #[test]
    fn test_tag_args_without_cover() {
        let args = transfer().build_tag_args(
            Path::new("talk.mp3"),
            &SourceTags::default(),
            None,
            Path::new("tmp.mp3"),
        );
        assert!(!args.contains(&"1:v".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a"));
    }

    #[tokio::test]
    async fn test_missing_tools_leave_output_untouched() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("talk.mp4");
        let output = dir.path().join("talk.mp3");
        std::fs::write(&source, b"video").unwrap();
        std::fs::write(&output, b"audio").unwrap();

        let config = ConverterConfig::with_paths(
            dir.path().join("no-ffmpeg"),
            dir.path().join("no-ffprobe"),
        );
        let err = FfmpegMetadataTransfer::new(config)
            .transfer(&source, &output, &MetadataOptions { extract_cover: true })
            .await
            .unwrap_err();

        assert!(matches!(err, MetadataError::ToolMissing { .. }));
        assert_eq!(std::fs::read(&output).unwrap(), b"audio");
        assert!(!FfmpegMetadataTransfer::temp_path(&output).exists());
    }
}
