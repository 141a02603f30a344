pub mod plan;
pub mod simulate;

use sdr_channels::AllocationError;

/// Stable snake_case name for an allocation failure, used in JSON output.
pub fn error_kind(error: &AllocationError) -> &'static str {
    match error {
        AllocationError::InvalidParameter(_) => "invalid_parameter",
        AllocationError::OutOfRange { .. } => "out_of_range",
        AllocationError::InsufficientBandwidth { .. } => "insufficient_bandwidth",
        AllocationError::RetuneOutOfRange { .. } => "retune_out_of_range",
        AllocationError::ChannelNotFound(_) => "channel_not_found",
        AllocationError::ResourceExhausted(_) => "resource_exhausted",
        AllocationError::Source(_) => "source",
    }
}
