// Channel handles - a consumer's claim on an admitted channel
//
// Releasing or dropping the handle removes the channel and retires its task.

use crate::allocator::AllocatorInner;
use crate::broadcast::{FrequencyChangeListener, ListenerResult};
use crate::error::Result;
use crate::tasks::{CancellationToken, TaskTicket};
use crate::types::{Channel, ChannelId, Hz};
use parking_lot::RwLock;
use std::sync::Weak;

/// Last LO state seen by one admitted channel
pub(crate) struct ChannelTracker {
    local_oscillator: RwLock<(Hz, Hz)>,
}

impl ChannelTracker {
    pub(crate) fn new(local_oscillator: (Hz, Hz)) -> Self {
        Self {
            local_oscillator: RwLock::new(local_oscillator),
        }
    }

    fn get(&self) -> (Hz, Hz) {
        *self.local_oscillator.read()
    }
}

impl FrequencyChangeListener for ChannelTracker {
    fn frequency_changed(&self, frequency: Hz, bandwidth: Hz) -> ListenerResult {
        *self.local_oscillator.write() = (frequency, bandwidth);
        Ok(())
    }
}

/// A consumer's claim on one admitted channel.
///
/// The channel stays in the allocator's registry until the handle is
/// released, either explicitly with [`release`](Self::release) or when the
/// handle is dropped.
pub struct ChannelSourceHandle {
    id: ChannelId,
    channel: Channel,
    tracker: std::sync::Arc<ChannelTracker>,
    ticket: TaskTicket,
    allocator: Weak<AllocatorInner>,
    released: bool,
}

impl ChannelSourceHandle {
    pub(crate) fn new(
        id: ChannelId,
        channel: Channel,
        tracker: std::sync::Arc<ChannelTracker>,
        ticket: TaskTicket,
        allocator: Weak<AllocatorInner>,
    ) -> Self {
        Self {
            id,
            channel,
            tracker,
            ticket,
            allocator,
            released: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// LO frequency and bandwidth as of the last broadcast
    pub fn local_oscillator(&self) -> (Hz, Hz) {
        self.tracker.get()
    }

    /// Offset of the channel center from the LO, for the consumer's mixer
    pub fn frequency_offset(&self) -> Hz {
        self.channel.center_frequency() - self.tracker.get().0
    }

    pub fn task_id(&self) -> &str {
        &self.ticket.task_id
    }

    /// Cancelled when the channel is released
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ticket.cancel_token.clone()
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match self.allocator.upgrade() {
            Some(allocator) => allocator.release(self.id),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ChannelSourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSourceHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("task_id", &self.ticket.task_id)
            .finish()
    }
}

impl Drop for ChannelSourceHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(allocator) = self.allocator.upgrade() {
            if let Err(e) = allocator.release(self.id) {
                log::warn!("Dropping handle for {}: {}", self.id, e);
            }
        }
    }
}
