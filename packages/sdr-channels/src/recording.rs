// Recorded capture presented as a tunable source
//
// A recording has a fixed sample rate and a nominal tunable span. Channels are
// admitted against it like against live hardware; every retune is written back
// into the recording's configuration and handed to the settings store.

use crate::allocator::{AllocatorConfig, ChannelAllocator};
use crate::broadcast::{FrequencyChangeListener, ListenerId};
use crate::error::Result;
use crate::handle::ChannelSourceHandle;
use crate::settings::SettingsStore;
use crate::source::{SourceError, SourceResult, TunableSource};
use crate::tasks::ChannelExecutor;
use crate::types::{Channel, FrequencyRange, Hz};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const MINIMUM_TUNABLE_FREQUENCY: Hz = 400_000_000;
pub const MAXIMUM_TUNABLE_FREQUENCY: Hz = 2_050_000_000;
pub const SAMPLE_RATE: Hz = 192_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfiguration {
    pub alias: String,
    pub file_path: PathBuf,
    pub center_frequency: Hz,
}

impl RecordingConfiguration {
    pub fn new(alias: impl Into<String>, file_path: impl Into<PathBuf>, center_frequency: Hz) -> Self {
        Self {
            alias: alias.into(),
            file_path: file_path.into(),
            center_frequency,
        }
    }
}

struct RecordingTuner {
    configuration: Arc<RwLock<RecordingConfiguration>>,
    settings: Arc<dyn SettingsStore>,
    range: FrequencyRange,
}

impl TunableSource for RecordingTuner {
    fn tunable_range(&self) -> FrequencyRange {
        self.range
    }

    fn instantaneous_bandwidth(&self) -> Hz {
        SAMPLE_RATE
    }

    // Recordings cannot be corrected after the fact
    fn correction_limit_ppm(&self) -> f64 {
        0.0
    }

    fn initial_center_frequency(&self) -> Hz {
        self.configuration.read().center_frequency
    }

    fn apply_center_frequency(&self, frequency: Hz) -> SourceResult<()> {
        let snapshot = {
            let mut configuration = self.configuration.write();
            configuration.center_frequency = frequency;
            configuration.clone()
        };

        if let Err(e) = self.settings.save(&snapshot) {
            log::warn!("Recording '{}': {}", snapshot.alias, e);
        }
        Ok(())
    }

    fn apply_frequency_correction(&self, _ppm: f64) -> SourceResult<()> {
        Ok(())
    }
}

pub struct Recording {
    configuration: Arc<RwLock<RecordingConfiguration>>,
    settings: Arc<dyn SettingsStore>,
    allocator: ChannelAllocator,
}

impl Recording {
    pub fn new(
        configuration: RecordingConfiguration,
        settings: Arc<dyn SettingsStore>,
        executor: Arc<dyn ChannelExecutor>,
    ) -> Result<Self> {
        let configuration = Arc::new(RwLock::new(configuration));
        let tuner = RecordingTuner {
            configuration: Arc::clone(&configuration),
            settings: Arc::clone(&settings),
            range: FrequencyRange::new(MINIMUM_TUNABLE_FREQUENCY, MAXIMUM_TUNABLE_FREQUENCY)?,
        };
        let allocator = ChannelAllocator::new(Arc::new(tuner), executor, AllocatorConfig::default())?;

        Ok(Self {
            configuration,
            settings,
            allocator,
        })
    }

    pub fn alias(&self) -> String {
        self.configuration.read().alias.clone()
    }

    pub fn set_alias(&self, alias: impl Into<String>) -> SourceResult<()> {
        let snapshot = {
            let mut configuration = self.configuration.write();
            configuration.alias = alias.into();
            configuration.clone()
        };
        self.settings.save(&snapshot)?;
        Ok(())
    }

    /// Points the recording at another file. Refused while channels are
    /// admitted.
    pub fn set_recording_file(&self, path: impl AsRef<Path>) -> SourceResult<()> {
        let path = std::path::absolute(path.as_ref())?;
        let snapshot = self
            .allocator
            .with_idle(|| {
                let mut configuration = self.configuration.write();
                configuration.file_path = path;
                configuration.clone()
            })
            .map_err(SourceError::ChannelsActive)?;
        log::info!(
            "Recording '{}' now reads {}",
            snapshot.alias,
            snapshot.file_path.display()
        );
        self.settings.save(&snapshot)?;
        Ok(())
    }

    pub fn has_channels(&self) -> bool {
        self.allocator.channel_count() > 0
    }

    pub fn request_channel(&self, channel: Channel) -> Result<ChannelSourceHandle> {
        self.allocator.try_admit(channel)
    }

    pub fn release_channel(&self, handle: ChannelSourceHandle) -> Result<()> {
        handle.release()
    }

    pub fn add_frequency_change_listener(
        &self,
        listener: Arc<dyn FrequencyChangeListener>,
    ) -> ListenerId {
        self.allocator.add_listener(listener)
    }

    pub fn remove_frequency_change_listener(&self, id: ListenerId) -> bool {
        self.allocator.remove_listener(id)
    }

    pub fn configuration(&self) -> RecordingConfiguration {
        self.configuration.read().clone()
    }

    pub fn allocator(&self) -> &ChannelAllocator {
        &self.allocator
    }
}

impl PartialEq for Recording {
    fn eq(&self, other: &Self) -> bool {
        self.alias() == other.alias()
    }
}

impl Eq for Recording {}

impl PartialOrd for Recording {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Recording {
    fn cmp(&self, other: &Self) -> Ordering {
        self.alias().cmp(&other.alias())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;
    use crate::tasks::TaskManager;

    fn recording(alias: &str, store: Arc<MemorySettingsStore>) -> Recording {
        Recording::new(
            RecordingConfiguration::new(alias, "/tmp/capture.iq", 1_000_000_000),
            store,
            Arc::new(TaskManager::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_retune_updates_and_saves_configuration() {
        let store = Arc::new(MemorySettingsStore::new());
        let recording = recording("capture", Arc::clone(&store));
        assert!(!recording.has_channels());

        let handle = recording
            .request_channel(Channel::new(1_000_050_000, 12_500).unwrap())
            .unwrap();
        assert!(recording.has_channels());
        assert_eq!(recording.configuration().center_frequency, 1_000_050_000);
        assert_eq!(store.save_count(), 1);
        assert_eq!(
            store.last_saved().unwrap().center_frequency,
            1_000_050_000
        );

        recording.release_channel(handle).unwrap();
        assert!(!recording.has_channels());
        // The LO stays put once the last channel leaves
        assert_eq!(recording.configuration().center_frequency, 1_000_050_000);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_recording_file_locked_while_channels_active() {
        let store = Arc::new(MemorySettingsStore::new());
        let recording = recording("capture", Arc::clone(&store));

        let handle = recording
            .request_channel(Channel::new(1_000_000_000, 12_500).unwrap())
            .unwrap();
        let err = recording.set_recording_file("/tmp/other.iq").unwrap_err();
        assert!(matches!(err, SourceError::ChannelsActive(1)));
        assert_eq!(
            recording.configuration().file_path,
            PathBuf::from("/tmp/capture.iq")
        );

        drop(handle);
        recording.set_recording_file("other.iq").unwrap();
        let path = recording.configuration().file_path;
        assert!(path.is_absolute());
        assert!(path.ends_with("other.iq"));
        assert_eq!(store.last_saved().unwrap().file_path, path);
    }

    #[test]
    fn test_channel_outside_recording_span() {
        let recording = recording("capture", Arc::new(MemorySettingsStore::new()));
        let err = recording
            .request_channel(Channel::new(162_550_000, 25_000).unwrap())
            .unwrap_err();
        assert!(matches!(err, crate::AllocationError::OutOfRange { .. }));
    }

    #[test]
    fn test_alias_saves_and_orders() {
        let store = Arc::new(MemorySettingsStore::new());
        let first = recording("b-side", Arc::clone(&store));
        let second = recording("a-side", Arc::clone(&store));

        assert!(second < first);
        first.set_alias("a-first").unwrap();
        assert!(first < second);
        assert_eq!(store.last_saved().unwrap().alias, "a-first");

        let mut all = vec![second, first];
        all.sort();
        assert_eq!(all[0].alias(), "a-first");
    }
}
