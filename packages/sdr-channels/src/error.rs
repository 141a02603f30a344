// Allocation errors
//
// Every failure an admission, release or retune can report, with a hint for
// callers on whether retrying later can succeed.

use crate::source::SourceError;
use crate::types::{ChannelId, Hz};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Channel {min}..{max} Hz is outside the tunable range {range_min}..{range_max} Hz")]
    OutOfRange {
        min: Hz,
        max: Hz,
        range_min: Hz,
        range_max: Hz,
    },

    #[error("Channel {min}..{max} Hz cannot share the {bandwidth} Hz window with locked span {locked_min}..{locked_max} Hz")]
    InsufficientBandwidth {
        min: Hz,
        max: Hz,
        locked_min: Hz,
        locked_max: Hz,
        bandwidth: Hz,
    },

    #[error("Retune to {frequency} Hz falls outside the tunable range {range_min}..{range_max} Hz")]
    RetuneOutOfRange {
        frequency: Hz,
        range_min: Hz,
        range_max: Hz,
    },

    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Execution resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl AllocationError {
    /// Whether the same request may succeed later without being changed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocationError::InsufficientBandwidth { .. } | AllocationError::ResourceExhausted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AllocationError>;
