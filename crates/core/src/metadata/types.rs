//! Types for the metadata module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tags carried from the source container into the MP3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Album artist (if different from track artist).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    /// Release date or year, as stored in the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Track number, possibly `n/total`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SourceTags {
    /// Picks the known tags out of a probed tag map (keys lowercased).
    ///
    /// `year` is accepted when `date` is missing, and blank values are
    /// ignored.
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| {
            tags.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            title: get("title"),
            artist: get("artist"),
            album: get("album"),
            album_artist: get("album_artist"),
            date: get("date").or_else(|| get("year")),
            genre: get("genre"),
            track: get("track"),
            comment: get("comment"),
        }
    }

    /// Number of tags present.
    pub fn len(&self) -> usize {
        self.fields().filter(|(_, v)| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to ffmpeg metadata arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        self.fields()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .flat_map(|(key, value)| ["-metadata".to_string(), format!("{}={}", key, value)])
            .collect()
    }

    fn fields(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> {
        [
            ("title", self.title.as_deref()),
            ("artist", self.artist.as_deref()),
            ("album", self.album.as_deref()),
            ("album_artist", self.album_artist.as_deref()),
            ("date", self.date.as_deref()),
            ("genre", self.genre.as_deref()),
            ("track", self.track.as_deref()),
            ("comment", self.comment.as_deref()),
        ]
        .into_iter()
    }
}

/// Per-task options for a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOptions {
    /// Embed the source's cover picture.
    pub extract_cover: bool,
}

/// What a successful transfer wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Tags written to the MP3.
    pub tags: SourceTags,
    /// Whether a cover picture was embedded.
    pub cover_embedded: bool,
}

impl TransferReport {
    /// Whether the output was left untouched.
    pub fn is_noop(&self) -> bool {
        self.tags.is_empty() && !self.cover_embedded
    }
}
