// Frequency value types
//
// Ranges and channels are validated on construction so that their edges and
// spans are representable; every accessor below relies on that.

use crate::error::{AllocationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frequency in hertz
pub type Hz = i64;

/// Tunable span of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrequencyRange {
    minimum: Hz,
    maximum: Hz,
}

impl FrequencyRange {
    pub fn new(minimum: Hz, maximum: Hz) -> Result<Self> {
        if minimum >= maximum {
            return Err(AllocationError::InvalidParameter(format!(
                "frequency range minimum {} must be below maximum {}",
                minimum, maximum
            )));
        }
        if maximum.checked_sub(minimum).is_none() {
            return Err(AllocationError::InvalidParameter(format!(
                "frequency range {}..{} Hz is too wide to represent",
                minimum, maximum
            )));
        }
        Ok(Self { minimum, maximum })
    }

    pub fn minimum(&self) -> Hz {
        self.minimum
    }

    pub fn maximum(&self) -> Hz {
        self.maximum
    }

    pub fn span(&self) -> Hz {
        self.maximum - self.minimum
    }

    /// Inclusive containment of a single frequency
    pub fn contains(&self, frequency: Hz) -> bool {
        self.minimum <= frequency && frequency <= self.maximum
    }

    /// Whether the channel sits strictly inside this range on both edges
    pub fn contains_channel(&self, channel: &Channel) -> bool {
        self.minimum < channel.min_frequency() && self.maximum > channel.max_frequency()
    }

    pub fn overlaps(&self, other: &FrequencyRange) -> bool {
        self.minimum <= other.maximum && other.minimum <= self.maximum
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} Hz", self.minimum, self.maximum)
    }
}

/// A requested narrowband window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Channel {
    center_frequency: Hz,
    bandwidth: Hz,
}

impl Channel {
    pub fn new(center_frequency: Hz, bandwidth: Hz) -> Result<Self> {
        if bandwidth <= 0 {
            return Err(AllocationError::InvalidParameter(format!(
                "channel bandwidth must be positive, got {}",
                bandwidth
            )));
        }
        let half = bandwidth / 2;
        if center_frequency.checked_sub(half).is_none()
            || center_frequency.checked_add(half).is_none()
        {
            return Err(AllocationError::InvalidParameter(format!(
                "channel {} Hz ({} Hz wide) has edges outside the representable frequency range",
                center_frequency, bandwidth
            )));
        }
        Ok(Self {
            center_frequency,
            bandwidth,
        })
    }

    pub fn center_frequency(&self) -> Hz {
        self.center_frequency
    }

    pub fn bandwidth(&self) -> Hz {
        self.bandwidth
    }

    pub fn min_frequency(&self) -> Hz {
        self.center_frequency - self.bandwidth / 2
    }

    pub fn max_frequency(&self) -> Hz {
        self.center_frequency + self.bandwidth / 2
    }

    pub fn contains(&self, frequency: Hz) -> bool {
        self.min_frequency() <= frequency && frequency <= self.max_frequency()
    }

    pub fn overlaps(&self, other: &Channel) -> bool {
        self.min_frequency() < other.max_frequency() && other.min_frequency() < self.max_frequency()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz ({} Hz wide)",
            self.center_frequency, self.bandwidth
        )
    }
}

/// Identity of an admitted channel. Issued in increasing order per allocator,
/// so it doubles as the insertion-order tie breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// An admitted channel together with its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TunedChannel {
    pub id: ChannelId,
    pub channel: Channel,
}
