// Source capability boundary
//
// A source is anything that can present one wideband window: a live tuner or
// a recorded capture. The allocator only needs its limits and a way to tell it
// where to tune; how samples get produced is not its concern.

use crate::error::{AllocationError, Result};
use crate::types::{FrequencyRange, Hz};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Source has {0} active channel(s)")]
    ChannelsActive(usize),

    #[error("Settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// What the allocator needs from a tuner or recording
pub trait TunableSource: Send + Sync {
    /// Absolute span the hardware can tune
    fn tunable_range(&self) -> FrequencyRange;

    /// Width of spectrum presented around the center frequency
    fn instantaneous_bandwidth(&self) -> Hz;

    /// Largest accepted magnitude of frequency correction, in ppm
    fn correction_limit_ppm(&self) -> f64;

    /// Where the LO sits before any channel is admitted
    fn initial_center_frequency(&self) -> Hz;

    fn apply_center_frequency(&self, frequency: Hz) -> SourceResult<()>;

    fn apply_frequency_correction(&self, ppm: f64) -> SourceResult<()>;
}

/// Static description of a source's capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    pub min_frequency: Hz,
    pub max_frequency: Hz,
    pub bandwidth: Hz,
    #[serde(default = "default_correction_limit")]
    pub correction_limit_ppm: f64,
    #[serde(default)]
    pub center_frequency: Option<Hz>,
}

fn default_correction_limit() -> f64 {
    1_000.0
}

impl SourceProfile {
    pub fn range(&self) -> Result<FrequencyRange> {
        FrequencyRange::new(self.min_frequency, self.max_frequency)
    }

    pub fn validate(&self) -> Result<()> {
        let range = self.range()?;
        if self.bandwidth <= 0 {
            return Err(AllocationError::InvalidParameter(format!(
                "source '{}' bandwidth must be positive",
                self.name
            )));
        }
        if let Some(center) = self.center_frequency {
            if !range.contains(center) {
                return Err(AllocationError::InvalidParameter(format!(
                    "source '{}' center frequency {} Hz is outside {}",
                    self.name, center, range
                )));
            }
        }
        Ok(())
    }
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            min_frequency: 24_000_000,
            max_frequency: 1_766_000_000,
            bandwidth: 2_048_000,
            correction_limit_ppm: default_correction_limit(),
            center_frequency: None,
        }
    }
}

/// In-memory source described by a `SourceProfile`; remembers what it was
/// last asked to tune.
pub struct FixedSource {
    profile: SourceProfile,
    range: FrequencyRange,
    tuned: RwLock<(Hz, f64)>,
}

impl FixedSource {
    pub fn new(profile: SourceProfile) -> Result<Self> {
        profile.validate()?;
        let range = profile.range()?;
        let center = profile
            .center_frequency
            .unwrap_or(range.minimum() + range.span() / 2);

        Ok(Self {
            profile,
            range,
            tuned: RwLock::new((center, 0.0)),
        })
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    pub fn tuned_frequency(&self) -> Hz {
        self.tuned.read().0
    }

    pub fn tuned_correction(&self) -> f64 {
        self.tuned.read().1
    }
}

impl TunableSource for FixedSource {
    fn tunable_range(&self) -> FrequencyRange {
        self.range
    }

    fn instantaneous_bandwidth(&self) -> Hz {
        self.profile.bandwidth
    }

    fn correction_limit_ppm(&self) -> f64 {
        self.profile.correction_limit_ppm
    }

    fn initial_center_frequency(&self) -> Hz {
        self.tuned.read().0
    }

    fn apply_center_frequency(&self, frequency: Hz) -> SourceResult<()> {
        self.tuned.write().0 = frequency;
        log::debug!("{}: tuned to {} Hz", self.profile.name, frequency);
        Ok(())
    }

    fn apply_frequency_correction(&self, ppm: f64) -> SourceResult<()> {
        self.tuned.write().1 = ppm;
        Ok(())
    }
}
