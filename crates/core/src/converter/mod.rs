//! Converter module for turning video files into MP3 audio.
//!
//! This module provides the `Converter` trait and an FFmpeg-backed
//! implementation. A converter runs one validated task at a time:
//!
//! - Extracts the first audio stream and encodes it with `libmp3lame`
//! - Optionally applies loudness normalization
//! - Streams progress updates while encoding
//! - Stops promptly when the task's cancel flag is raised
//! - Removes partial output on any failure
//!
//! Tags and cover art are handled separately by [`crate::metadata`].
//!
//! # Example
//!
//! ```ignore
//! use vidtune_core::converter::{Converter, FfmpegConverter};
//! use vidtune_core::task::{CancelFlag, TaskDescriptor, TaskId, TaskRequest};
//!
//! let converter = FfmpegConverter::with_defaults();
//!
//! // Validate ffmpeg is available and can encode MP3
//! converter.validate().await?;
//!
//! let task = TaskDescriptor::new(TaskId(1), TaskRequest::new("talk.mp4", "talk.mp3"))?;
//! let (tx, _rx) = tokio::sync::mpsc::channel(32);
//! let result = converter.convert(&task, tx, &CancelFlag::new()).await?;
//! println!("Converted in {} ms", result.elapsed_ms);
//! ```

mod capabilities;
mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use capabilities::{EncoderCapabilities, MP3_ENCODER};
pub use config::ConverterConfig;
pub use error::ConversionError;
pub use ffmpeg::FfmpegConverter;
pub(crate) use ffmpeg::remove_partial_output;
pub use traits::Converter;
pub use types::{ConversionProgress, MediaInfo, OUTPUT_EXTENSION, SUPPORTED_INPUT_EXTENSIONS};
