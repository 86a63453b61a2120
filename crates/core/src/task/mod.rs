//! Conversion tasks: what to convert, how, and how it ended.
//!
//! A [`TaskRequest`] is whatever the caller asked for. It becomes a
//! [`TaskDescriptor`] only after [`TaskDescriptor::new`] has checked the
//! source, the output location and the bitrate. Every descriptor ends in
//! exactly one [`TaskResult`].

mod cancel;
mod error;
mod types;

pub use cancel::CancelFlag;
pub use error::InvalidTaskError;
pub use types::{
    Bitrate, FailureKind, TaskDescriptor, TaskId, TaskRequest, TaskResult, TaskStatus,
    ALLOWED_BITRATES,
};
