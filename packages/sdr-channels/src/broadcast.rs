// Frequency change fan-out
//
// Listeners register with the broadcaster and receive every committed LO
// change synchronously, in registration order. Delivery happens outside the
// registration lock so a listener may add or remove listeners from inside its
// callback.

use crate::types::Hz;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type ListenerResult = Result<(), ListenerError>;

/// Receives LO frequency/bandwidth updates
pub trait FrequencyChangeListener: Send + Sync {
    fn frequency_changed(&self, frequency: Hz, bandwidth: Hz) -> ListenerResult;
}

impl<F> FrequencyChangeListener for F
where
    F: Fn(Hz, Hz) -> ListenerResult + Send + Sync,
{
    fn frequency_changed(&self, frequency: Hz, bandwidth: Hz) -> ListenerResult {
        self(frequency, bandwidth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A committed LO change. `generation` increases with every commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyUpdate {
    pub frequency: Hz,
    pub bandwidth: Hz,
    pub generation: u64,
}

struct Registration {
    id: ListenerId,
    listener: Arc<dyn FrequencyChangeListener>,
}

pub struct FrequencyChangeBroadcaster {
    listeners: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    delivered_generation: ReentrantMutex<Cell<u64>>,
}

impl FrequencyChangeBroadcaster {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            delivered_generation: ReentrantMutex::new(Cell::new(0)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn FrequencyChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Registration { id, listener });
        id
    }

    /// Returns false when the id was not (or no longer) registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Delivers the update to every listener and returns how many failed.
    ///
    /// Updates older than one already delivered are dropped.
    pub fn notify(&self, update: FrequencyUpdate) -> usize {
        // Held for the whole delivery so notifications from different threads
        // never interleave. Reentrant: a listener may retune from its callback.
        let delivered = self.delivered_generation.lock();
        if update.generation < delivered.get() {
            log::debug!(
                "Dropping stale frequency update (generation {} < {})",
                update.generation,
                delivered.get()
            );
            return 0;
        }
        delivered.set(update.generation);

        let targets: Vec<(ListenerId, Arc<dyn FrequencyChangeListener>)> = self
            .listeners
            .lock()
            .iter()
            .map(|registration| (registration.id, Arc::clone(&registration.listener)))
            .collect();

        let mut failures = 0;
        for (id, listener) in targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.frequency_changed(update.frequency, update.bandwidth)
            }));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    log::warn!("Frequency listener {:?} failed: {}", id, e);
                }
                Err(_) => {
                    failures += 1;
                    log::error!("Frequency listener {:?} panicked", id);
                }
            }
        }

        log::debug!(
            "Broadcast {} Hz / {} Hz to listeners ({} failed)",
            update.frequency,
            update.bandwidth,
            failures
        );
        failures
    }
}

impl Default for FrequencyChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(frequency: Hz, generation: u64) -> FrequencyUpdate {
        FrequencyUpdate {
            frequency,
            bandwidth: 192_000,
            generation,
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<(char, Hz)>>>, tag: char) -> Arc<dyn FrequencyChangeListener> {
        let log = Arc::clone(log);
        Arc::new(move |frequency: Hz, _bandwidth: Hz| -> ListenerResult {
            log.lock().push((tag, frequency));
            Ok(())
        })
    }

    #[test]
    fn test_delivers_in_registration_order() {
        let broadcaster = FrequencyChangeBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        broadcaster.add_listener(recorder(&log, 'a'));
        broadcaster.add_listener(recorder(&log, 'b'));
        broadcaster.add_listener(recorder(&log, 'c'));

        assert_eq!(broadcaster.notify(update(1_000, 1)), 0);
        assert_eq!(*log.lock(), vec![('a', 1_000), ('b', 1_000), ('c', 1_000)]);
    }

    #[test]
    fn test_failing_listener_does_not_stop_delivery() {
        let broadcaster = FrequencyChangeBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        broadcaster.add_listener(Arc::new(|_: Hz, _: Hz| -> ListenerResult {
            Err(ListenerError::new("demodulator gone"))
        }));
        broadcaster.add_listener(Arc::new(|_: Hz, _: Hz| -> ListenerResult {
            panic!("listener bug");
        }));
        broadcaster.add_listener(recorder(&log, 'z'));

        assert_eq!(broadcaster.notify(update(2_000, 1)), 2);
        assert_eq!(*log.lock(), vec![('z', 2_000)]);
    }

    #[test]
    fn test_remove_listener_is_idempotent() {
        let broadcaster = FrequencyChangeBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = broadcaster.add_listener(recorder(&log, 'a'));

        assert!(broadcaster.remove_listener(id));
        assert!(!broadcaster.remove_listener(id));
        assert_eq!(broadcaster.listener_count(), 0);

        broadcaster.notify(update(3_000, 1));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let broadcaster = FrequencyChangeBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        broadcaster.add_listener(recorder(&log, 'a'));

        broadcaster.notify(update(5_000, 4));
        broadcaster.notify(update(4_000, 3));
        broadcaster.notify(update(6_000, 5));

        assert_eq!(*log.lock(), vec![('a', 5_000), ('a', 6_000)]);
    }
}
