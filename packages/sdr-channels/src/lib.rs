//! Channel admission and local-oscillator retuning for a shared wideband source.
//!
//! A [`ChannelAllocator`] decides whether a requested [`Channel`] fits in the
//! source's instantaneous window next to the channels already admitted, and
//! moves the LO so that every admitted channel stays covered while the LO
//! itself stays clear of them.

pub mod allocator;
pub mod broadcast;
pub mod error;
pub mod handle;
pub mod oscillator;
pub mod recording;
pub mod registry;
pub mod settings;
pub mod source;
pub mod tasks;
pub mod types;

pub use allocator::{AllocatorConfig, ChannelAllocator, DEFAULT_GUARD_BAND};
pub use broadcast::{
    FrequencyChangeBroadcaster, FrequencyChangeListener, FrequencyUpdate, ListenerError,
    ListenerId, ListenerResult,
};
pub use error::{AllocationError, Result};
pub use handle::ChannelSourceHandle;
pub use oscillator::LocalOscillatorState;
pub use recording::{Recording, RecordingConfiguration};
pub use registry::ChannelRegistry;
pub use settings::{MemorySettingsStore, SettingsError, SettingsStore};
pub use source::{FixedSource, SourceError, SourceProfile, SourceResult, TunableSource};
pub use tasks::{ChannelExecutor, TaskManager, TaskTicket};
pub use types::*;
