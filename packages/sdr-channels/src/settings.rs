// Settings persistence collaborator
//
// Configuration changes are handed to a store; where and how it persists them
// is up to the embedding application.

use crate::recording::RecordingConfiguration;
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to save settings: {0}")]
    Save(String),
}

pub trait SettingsStore: Send + Sync {
    fn save(&self, recording: &RecordingConfiguration) -> Result<(), SettingsError>;
}

/// Keeps the most recent snapshot in memory
#[derive(Default)]
pub struct MemorySettingsStore {
    last_saved: RwLock<Option<RecordingConfiguration>>,
    save_count: RwLock<usize>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_saved(&self) -> Option<RecordingConfiguration> {
        self.last_saved.read().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.save_count.read()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn save(&self, recording: &RecordingConfiguration) -> Result<(), SettingsError> {
        *self.last_saved.write() = Some(recording.clone());
        *self.save_count.write() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_keeps_last_snapshot() {
        let store = MemorySettingsStore::new();
        assert!(store.last_saved().is_none());

        let mut config = RecordingConfiguration::new("first", "/tmp/a.iq", 1_000_000_000);
        store.save(&config).unwrap();
        config.alias = "second".to_string();
        store.save(&config).unwrap();

        assert_eq!(store.save_count(), 2);
        assert_eq!(store.last_saved().unwrap().alias, "second");
    }
}
