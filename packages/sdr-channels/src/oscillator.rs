// Local oscillator state - the one place LO center and correction are written
//
// Window edges saturate at the representable limits: a wide window around a
// center near the end of a range must not wrap.

use crate::error::{AllocationError, Result};
use crate::types::{FrequencyRange, Hz};
use serde::Serialize;

/// Current tuning of a source's local oscillator.
///
/// `set_center_frequency` and `set_frequency_correction` are the only
/// writers; everything else reads through the accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalOscillatorState {
    range: FrequencyRange,
    center_frequency: Hz,
    bandwidth: Hz,
    correction_ppm: f64,
    correction_limit_ppm: f64,
}

impl LocalOscillatorState {
    pub fn new(
        range: FrequencyRange,
        center_frequency: Hz,
        bandwidth: Hz,
        correction_limit_ppm: f64,
    ) -> Result<Self> {
        if bandwidth <= 0 {
            return Err(AllocationError::InvalidParameter(format!(
                "instantaneous bandwidth must be positive, got {}",
                bandwidth
            )));
        }
        if !correction_limit_ppm.is_finite() || correction_limit_ppm < 0.0 {
            return Err(AllocationError::InvalidParameter(format!(
                "correction limit must be a non-negative ppm value, got {}",
                correction_limit_ppm
            )));
        }
        if !range.contains(center_frequency) {
            return Err(AllocationError::InvalidParameter(format!(
                "initial center frequency {} Hz is outside {}",
                center_frequency, range
            )));
        }

        Ok(Self {
            range,
            center_frequency,
            bandwidth,
            correction_ppm: 0.0,
            correction_limit_ppm,
        })
    }

    pub fn range(&self) -> FrequencyRange {
        self.range
    }

    pub fn center_frequency(&self) -> Hz {
        self.center_frequency
    }

    pub fn bandwidth(&self) -> Hz {
        self.bandwidth
    }

    pub fn frequency_correction(&self) -> f64 {
        self.correction_ppm
    }

    pub fn correction_limit(&self) -> f64 {
        self.correction_limit_ppm
    }

    /// Lowest frequency inside the current window
    pub fn window_min(&self) -> Hz {
        self.center_frequency.saturating_sub(self.bandwidth / 2)
    }

    /// Highest frequency inside the current window
    pub fn window_max(&self) -> Hz {
        self.center_frequency.saturating_add(self.bandwidth / 2)
    }

    /// Frequency the hardware is actually asked for once ppm correction is applied
    pub fn tuned_frequency(&self) -> Hz {
        let offset = self.center_frequency as f64 * self.correction_ppm / 1_000_000.0;
        self.center_frequency.saturating_add(offset.round() as Hz)
    }

    /// Moves the LO and returns the previous center frequency.
    pub fn set_center_frequency(&mut self, frequency: Hz) -> Result<Hz> {
        if !self.range.contains(frequency) {
            return Err(AllocationError::RetuneOutOfRange {
                frequency,
                range_min: self.range.minimum(),
                range_max: self.range.maximum(),
            });
        }

        let previous = self.center_frequency;
        self.center_frequency = frequency;
        Ok(previous)
    }

    /// Sets the ppm correction and returns the previous value.
    pub fn set_frequency_correction(&mut self, ppm: f64) -> Result<f64> {
        if !ppm.is_finite() || ppm.abs() > self.correction_limit_ppm {
            return Err(AllocationError::InvalidParameter(format!(
                "frequency correction {} ppm exceeds the +/-{} ppm limit",
                ppm, self.correction_limit_ppm
            )));
        }

        let previous = self.correction_ppm;
        self.correction_ppm = ppm;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lo() -> LocalOscillatorState {
        let range = FrequencyRange::new(400_000_000, 2_050_000_000).unwrap();
        LocalOscillatorState::new(range, 1_000_000_000, 192_000, 100.0).unwrap()
    }

    #[test]
    fn test_rejects_bad_construction() {
        let range = FrequencyRange::new(400_000_000, 2_050_000_000).unwrap();
        assert!(LocalOscillatorState::new(range, 1_000_000_000, 0, 100.0).is_err());
        assert!(LocalOscillatorState::new(range, 100_000_000, 192_000, 100.0).is_err());
        assert!(LocalOscillatorState::new(range, 1_000_000_000, 192_000, f64::NAN).is_err());
    }

    #[test]
    fn test_window_edges_saturate() {
        let range = FrequencyRange::new(i64::MAX - 1_000, i64::MAX).unwrap();
        let state = LocalOscillatorState::new(range, i64::MAX - 10, 192_000, 100.0).unwrap();
        assert_eq!(state.window_max(), i64::MAX);
        assert_eq!(state.window_min(), i64::MAX - 10 - 96_000);
    }

    #[test]
    fn test_set_center_frequency_returns_previous() {
        let mut state = lo();
        let previous = state.set_center_frequency(1_500_000_000).unwrap();
        assert_eq!(previous, 1_000_000_000);
        assert_eq!(state.center_frequency(), 1_500_000_000);
        assert_eq!(state.window_min(), 1_499_904_000);
        assert_eq!(state.window_max(), 1_500_096_000);
    }

    #[test]
    fn test_set_center_frequency_out_of_range_leaves_state() {
        let mut state = lo();
        let err = state.set_center_frequency(2_050_000_001).unwrap_err();
        assert!(matches!(err, AllocationError::RetuneOutOfRange { .. }));
        assert_eq!(state.center_frequency(), 1_000_000_000);

        // Range edges are inclusive
        assert!(state.set_center_frequency(400_000_000).is_ok());
    }

    #[test]
    fn test_frequency_correction_bounds() {
        let mut state = lo();
        assert_eq!(state.set_frequency_correction(-42.5).unwrap(), 0.0);
        assert_eq!(state.frequency_correction(), -42.5);

        assert!(state.set_frequency_correction(100.5).is_err());
        assert!(state.set_frequency_correction(f64::INFINITY).is_err());
        assert_eq!(state.frequency_correction(), -42.5);
    }

    #[test]
    fn test_tuned_frequency_applies_correction() {
        let mut state = lo();
        assert_eq!(state.tuned_frequency(), 1_000_000_000);
        state.set_frequency_correction(10.0).unwrap();
        assert_eq!(state.tuned_frequency(), 1_000_010_000);
        // Correction does not move the nominal center
        assert_eq!(state.center_frequency(), 1_000_000_000);
    }
}
