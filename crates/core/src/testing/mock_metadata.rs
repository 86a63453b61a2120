//! Mock metadata transfer for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metadata::{MetadataError, MetadataOptions, MetadataTransfer, SourceTags, TransferReport};

/// A recorded transfer: source, output and options.
pub type RecordedTransfer = (PathBuf, PathBuf, MetadataOptions);

/// Mock implementation of the MetadataTransfer trait.
///
/// Records every call and reports the source's file stem as its title.
/// The output file is never touched.
#[derive(Debug, Clone, Default)]
pub struct MockMetadataTransfer {
    transfers: Arc<RwLock<Vec<RecordedTransfer>>>,
    /// If set, every transfer fails with this message.
    failure: Arc<RwLock<Option<String>>>,
}

impl MockMetadataTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded transfers.
    pub async fn recorded_transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers.read().await.clone()
    }

    /// Make every following transfer fail.
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write().await = Some(message.into());
    }
}

#[async_trait]
impl MetadataTransfer for MockMetadataTransfer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transfer(
        &self,
        source_path: &Path,
        output_path: &Path,
        options: &MetadataOptions,
    ) -> Result<TransferReport, MetadataError> {
        self.transfers.write().await.push((
            source_path.to_path_buf(),
            output_path.to_path_buf(),
            *options,
        ));

        if let Some(message) = self.failure.read().await.clone() {
            return Err(MetadataError::write_failed(message, None));
        }

        Ok(TransferReport {
            tags: SourceTags {
                title: source_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string()),
                ..Default::default()
            },
            cover_embedded: options.extract_cover,
        })
    }
}
