pub mod batch;
pub mod config;
pub mod converter;
pub mod metadata;
pub mod metrics;
pub mod reporter;
pub mod scan;
pub mod task;
pub mod testing;

pub use batch::{default_worker_count, BatchCoordinator, BatchError, BatchState, BatchStatus};
pub use config::{
    load_config, load_config_from_str, save_config, validate_config, Config, ConfigError,
    ConversionSettings, Theme,
};
pub use converter::{ConversionError, Converter, ConverterConfig, FfmpegConverter};
pub use metadata::{FfmpegMetadataTransfer, MetadataError, MetadataTransfer};
pub use reporter::{BatchEvent, ChannelReporter, LogReporter, NoopReporter, ProgressReporter};
pub use scan::{collect_inputs, plan_output_path, ScanError};
pub use task::{
    Bitrate, FailureKind, InvalidTaskError, TaskDescriptor, TaskId, TaskRequest, TaskResult,
    TaskStatus,
};
