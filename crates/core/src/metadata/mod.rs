//! Metadata transfer from source videos to finished MP3 files.
//!
//! Conversion strips every tag so the encoded audio is deterministic; this
//! module puts the useful ones back afterwards. Title, artist, album,
//! album artist, date, genre, track and comment are copied as ID3v2.3
//! frames, and a cover picture is embedded when the source has one (or a
//! first video frame to stand in for one).
//!
//! A failed transfer never fails the task. The coordinator logs it and
//! records the message as the result's `metadata_warning`.

mod error;
mod ffmpeg;
mod traits;
mod types;

pub use error::MetadataError;
pub use ffmpeg::FfmpegMetadataTransfer;
pub use traits::MetadataTransfer;
pub use types::{MetadataOptions, SourceTags, TransferReport};
