use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::BatchConfig;
use crate::converter::ConverterConfig;
use crate::scan::plan_output_path;
use crate::task::{Bitrate, TaskRequest};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub conversion: ConversionSettings,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Per-task defaults applied to every input
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversionSettings {
    #[serde(default)]
    pub bitrate: Bitrate,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default = "default_true")]
    pub preserve_metadata: bool,
    #[serde(default = "default_true")]
    pub extract_cover: bool,
    /// Where MP3s go; next to each source when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<PathBuf>,
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            bitrate: Bitrate::default(),
            normalize: false,
            preserve_metadata: default_true(),
            extract_cover: default_true(),
            output_directory: None,
            overwrite: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl ConversionSettings {
    /// Builds the request converting `source` with these settings.
    pub fn request_for(&self, source: &Path) -> TaskRequest {
        let output = plan_output_path(source, self.output_directory.as_deref());
        TaskRequest::new(source, output)
            .with_bitrate(self.bitrate.kbps())
            .with_normalize(self.normalize)
            .with_metadata(self.preserve_metadata)
            .with_cover(self.extract_cover)
            .with_overwrite(self.overwrite)
    }
}

/// Front-end preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UiConfig {
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}
