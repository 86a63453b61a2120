//! Trait definitions for the metadata module.

use async_trait::async_trait;
use std::path::Path;

use super::error::MetadataError;
use super::types::{MetadataOptions, TransferReport};

/// Copies tags and cover art from a source video into a finished MP3.
#[async_trait]
pub trait MetadataTransfer: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Writes the source's tags (and cover, if asked) into `output_path`.
    ///
    /// On error the output must be left as it was before the call.
    async fn transfer(
        &self,
        source_path: &Path,
        output_path: &Path,
        options: &MetadataOptions,
    ) -> Result<TransferReport, MetadataError>;
}
