// Channel allocator - admission control and LO retuning for one source
//
// The allocator owns the registry of admitted channels and the source's LO
// state behind a single mutex: admission, release and retuning are one
// transaction each. Listener notification happens after the lock is dropped.

use crate::broadcast::{
    FrequencyChangeBroadcaster, FrequencyChangeListener, FrequencyUpdate, ListenerId,
};
use crate::error::{AllocationError, Result};
use crate::handle::{ChannelSourceHandle, ChannelTracker};
use crate::oscillator::LocalOscillatorState;
use crate::registry::ChannelRegistry;
use crate::source::TunableSource;
use crate::tasks::{ChannelExecutor, TaskTicket};
use crate::types::{Channel, ChannelId, FrequencyRange, Hz, TunedChannel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Margin kept between the LO center and the edge of any locked channel
pub const DEFAULT_GUARD_BAND: Hz = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Margin in Hz between the LO center and any locked channel edge
    pub guard_band: Hz,
    /// Tune straight onto a channel when it is the only one locked, instead
    /// of displacing the LO off its span
    pub center_lone_channel: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            guard_band: DEFAULT_GUARD_BAND,
            center_lone_channel: true,
        }
    }
}

/// Checks whether `channel` may join the channels already in `registry`.
pub fn check_admission(
    registry: &ChannelRegistry,
    range: FrequencyRange,
    bandwidth: Hz,
    channel: &Channel,
) -> Result<()> {
    if !range.contains_channel(channel) {
        return Err(AllocationError::OutOfRange {
            min: channel.min_frequency(),
            max: channel.max_frequency(),
            range_min: range.minimum(),
            range_max: range.maximum(),
        });
    }

    let Some((min_locked, max_locked)) = registry.locked_span() else {
        return Ok(());
    };

    // Above the lowest locked edge and reachable from it
    if min_locked <= channel.min_frequency()
        && fits(channel.max_frequency().checked_sub(min_locked), bandwidth)
    {
        return Ok(());
    }

    // Below the highest locked edge and reachable from it
    if channel.max_frequency() <= max_locked
        && fits(max_locked.checked_sub(channel.min_frequency()), bandwidth)
    {
        return Ok(());
    }

    Err(AllocationError::InsufficientBandwidth {
        min: channel.min_frequency(),
        max: channel.max_frequency(),
        locked_min: min_locked,
        locked_max: max_locked,
        bandwidth,
    })
}

/// `None` widths did not fit in an `Hz`, so they never fit a window either.
fn fits(width: Option<Hz>, bandwidth: Hz) -> bool {
    width.is_some_and(|width| width <= bandwidth)
}

/// Floor of the mean, without overflowing on far-apart edges.
fn midpoint(low: Hz, high: Hz) -> Hz {
    ((low as i128 + high as i128).div_euclid(2)) as Hz
}

/// Computes the LO center for the locked channels, or `None` when nothing is
/// locked.
///
/// Starts from the midpoint of the locked span. Each channel widened by the
/// guard band on both sides is an exclusion zone; overlapping zones form one
/// cluster. A midpoint inside a cluster moves to the nearer cluster edge, so
/// a single move lands clear of every channel. A candidate that would leave a
/// channel outside the window, or the LO outside the tunable range, is
/// skipped for the other edge, and if neither edge works the midpoint stays.
pub fn compute_center_frequency(
    registry: &ChannelRegistry,
    range: FrequencyRange,
    bandwidth: Hz,
    config: &AllocatorConfig,
) -> Option<Hz> {
    let (min_locked, max_locked) = registry.locked_span()?;

    if registry.len() == 1 && config.center_lone_channel {
        return registry.first().map(|tuned| tuned.channel.center_frequency());
    }

    let middle = midpoint(min_locked, max_locked);
    let guard = config.guard_band;

    let Some((cluster_min, cluster_max)) = guard_clusters(registry, guard)
        .into_iter()
        .find(|&(lo, hi)| {
            lo.saturating_sub(guard) < middle && middle < hi.saturating_add(guard)
        })
    else {
        return Some(middle);
    };

    let left = cluster_min.saturating_sub(guard);
    let right = cluster_max.saturating_add(guard);
    let below = middle.saturating_sub(cluster_min);
    let above = cluster_max.saturating_sub(middle);
    let (nearer, farther) = if below < above {
        (left, right)
    } else {
        (right, left)
    };

    let half = bandwidth / 2;
    let usable = |center: Hz| {
        range.contains(center)
            && center.saturating_sub(half) <= min_locked
            && max_locked <= center.saturating_add(half)
    };

    for candidate in [nearer, farther] {
        if usable(candidate) {
            return Some(candidate);
        }
    }

    log::warn!(
        "No guard-free LO position covers {}..{} Hz; staying at midpoint {} Hz",
        min_locked,
        max_locked,
        middle
    );
    Some(middle)
}

/// Channel extents grouped so that exclusion zones `(min - guard, max + guard)`
/// of different groups do not overlap. Registry order is ascending by minimum.
fn guard_clusters(registry: &ChannelRegistry, guard: Hz) -> Vec<(Hz, Hz)> {
    let mut clusters: Vec<(Hz, Hz)> = Vec::new();

    for tuned in registry.iter() {
        let (lo, hi) = (tuned.channel.min_frequency(), tuned.channel.max_frequency());
        match clusters.last_mut() {
            Some(last) if lo.saturating_sub(guard) < last.1.saturating_add(guard) => {
                last.1 = last.1.max(hi)
            }
            _ => clusters.push((lo, hi)),
        }
    }

    clusters
}

struct Admission {
    ticket: TaskTicket,
    listener: ListenerId,
}

struct AllocatorState {
    registry: ChannelRegistry,
    oscillator: LocalOscillatorState,
    admissions: HashMap<ChannelId, Admission>,
    next_id: u64,
    generation: u64,
}

impl AllocatorState {
    /// Stamps a broadcast if the LO differs from `before`.
    fn pending_update(&mut self, before: (Hz, Hz)) -> Option<FrequencyUpdate> {
        let now = (self.oscillator.center_frequency(), self.oscillator.bandwidth());
        if now == before {
            return None;
        }
        self.generation += 1;
        Some(FrequencyUpdate {
            frequency: now.0,
            bandwidth: now.1,
            generation: self.generation,
        })
    }

    fn lo(&self) -> (Hz, Hz) {
        (self.oscillator.center_frequency(), self.oscillator.bandwidth())
    }
}

pub(crate) struct AllocatorInner {
    state: Mutex<AllocatorState>,
    broadcaster: FrequencyChangeBroadcaster,
    source: Arc<dyn TunableSource>,
    executor: Arc<dyn ChannelExecutor>,
    config: AllocatorConfig,
}

impl AllocatorInner {
    /// Recomputes and applies the LO. Leaves the state untouched on error.
    fn retune(&self, state: &mut AllocatorState) -> Result<()> {
        state.registry.sort();

        let Some(center) = compute_center_frequency(
            &state.registry,
            state.oscillator.range(),
            state.oscillator.bandwidth(),
            &self.config,
        ) else {
            return Ok(());
        };

        if center == state.oscillator.center_frequency() {
            return Ok(());
        }

        let previous = state.oscillator.set_center_frequency(center).map_err(|e| {
            log::error!(
                "Retune inconsistent with admission for {} channel(s): {}",
                state.registry.len(),
                e
            );
            e
        })?;

        if let Err(e) = self.source.apply_center_frequency(center) {
            log::error!("Source rejected retune to {} Hz: {}", center, e);
            self.restore(state, previous);
            return Err(e.into());
        }

        log::info!(
            "LO retuned {} -> {} Hz for {} channel(s)",
            previous,
            center,
            state.registry.len()
        );
        Ok(())
    }

    /// Puts the LO back to `frequency` after a rolled back change.
    fn restore(&self, state: &mut AllocatorState, frequency: Hz) {
        if state.oscillator.center_frequency() == frequency {
            return;
        }
        match state.oscillator.set_center_frequency(frequency) {
            Ok(_) => {
                if let Err(e) = self.source.apply_center_frequency(frequency) {
                    log::error!("Failed to restore source to {} Hz: {}", frequency, e);
                }
            }
            Err(e) => log::error!("Failed to restore LO to {} Hz: {}", frequency, e),
        }
    }

    pub(crate) fn release(&self, id: ChannelId) -> Result<()> {
        let update = {
            let mut state = self.state.lock();

            let Some(channel) = state.registry.remove(id) else {
                log::warn!("Release of unknown channel {} ignored", id);
                return Err(AllocationError::ChannelNotFound(id));
            };

            if let Some(admission) = state.admissions.remove(&id) {
                self.broadcaster.remove_listener(admission.listener);
                self.executor.retire(&admission.ticket);
            }

            log::info!("Released {} ({})", id, channel);

            if state.registry.is_empty() {
                log::debug!(
                    "No channels left; LO stays at {} Hz",
                    state.oscillator.center_frequency()
                );
                None
            } else {
                let before = state.lo();
                self.retune(&mut state)?;
                state.pending_update(before)
            }
        };

        if let Some(update) = update {
            self.broadcaster.notify(update);
        }
        Ok(())
    }
}

/// Admission-control and retuning engine for one source.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ChannelAllocator {
    inner: Arc<AllocatorInner>,
}

impl ChannelAllocator {
    pub fn new(
        source: Arc<dyn TunableSource>,
        executor: Arc<dyn ChannelExecutor>,
        config: AllocatorConfig,
    ) -> Result<Self> {
        if config.guard_band < 0 {
            return Err(AllocationError::InvalidParameter(format!(
                "guard band must not be negative, got {}",
                config.guard_band
            )));
        }

        let oscillator = LocalOscillatorState::new(
            source.tunable_range(),
            source.initial_center_frequency(),
            source.instantaneous_bandwidth(),
            source.correction_limit_ppm(),
        )?;

        log::debug!(
            "Allocator over {} with {} Hz window, LO at {} Hz",
            oscillator.range(),
            oscillator.bandwidth(),
            oscillator.center_frequency()
        );

        Ok(Self {
            inner: Arc::new(AllocatorInner {
                state: Mutex::new(AllocatorState {
                    registry: ChannelRegistry::new(),
                    oscillator,
                    admissions: HashMap::new(),
                    next_id: 1,
                    generation: 0,
                }),
                broadcaster: FrequencyChangeBroadcaster::new(),
                source,
                executor,
                config,
            }),
        })
    }

    /// Admits `channel` if it fits alongside the locked channels, retuning
    /// the LO as needed.
    pub fn try_admit(&self, channel: Channel) -> Result<ChannelSourceHandle> {
        let inner = &self.inner;

        let (handle, update) = {
            let mut state = inner.state.lock();
            let range = state.oscillator.range();
            let bandwidth = state.oscillator.bandwidth();

            if let Err(e) = check_admission(&state.registry, range, bandwidth, &channel) {
                log::info!("Rejected {}: {}", channel, e);
                return Err(e);
            }

            let id = ChannelId(state.next_id);
            state.next_id += 1;
            let before = state.lo();

            state.registry.insert(id, channel);
            if let Err(e) = inner.retune(&mut state) {
                state.registry.remove(id);
                log::error!("Admission of {} rolled back: {}", channel, e);
                return Err(e);
            }

            let ticket = match inner.executor.launch(id, &channel) {
                Ok(ticket) => ticket,
                Err(e) => {
                    state.registry.remove(id);
                    inner.restore(&mut state, before.0);
                    log::warn!("Admission of {} rolled back: {}", channel, e);
                    return Err(AllocationError::ResourceExhausted(e.to_string()));
                }
            };

            let tracker = Arc::new(ChannelTracker::new(state.lo()));
            let listener = inner
                .broadcaster
                .add_listener(Arc::clone(&tracker) as Arc<dyn FrequencyChangeListener>);
            state.admissions.insert(
                id,
                Admission {
                    ticket: ticket.clone(),
                    listener,
                },
            );

            log::info!(
                "Admitted {} as {} ({} channel(s), LO {} Hz)",
                channel,
                id,
                state.registry.len(),
                state.oscillator.center_frequency()
            );

            let handle =
                ChannelSourceHandle::new(id, channel, tracker, ticket, Arc::downgrade(inner));
            (handle, state.pending_update(before))
        };

        if let Some(update) = update {
            inner.broadcaster.notify(update);
        }
        Ok(handle)
    }

    /// Releases the channel with `id`. Unknown ids yield `ChannelNotFound`
    /// and leave the registry untouched.
    pub fn release(&self, id: ChannelId) -> Result<()> {
        self.inner.release(id)
    }

    /// Recomputes the LO for the current channels and broadcasts a change.
    pub fn update_center_frequency(&self) -> Result<()> {
        let update = {
            let mut state = self.inner.state.lock();
            let before = state.lo();
            self.inner.retune(&mut state)?;
            state.pending_update(before)
        };

        if let Some(update) = update {
            self.inner.broadcaster.notify(update);
        }
        Ok(())
    }

    pub fn set_frequency_correction(&self, ppm: f64) -> Result<()> {
        let mut state = self.inner.state.lock();
        let previous = state.oscillator.set_frequency_correction(ppm)?;

        if let Err(e) = self.inner.source.apply_frequency_correction(ppm) {
            if let Err(revert) = state.oscillator.set_frequency_correction(previous) {
                log::error!("Failed to restore frequency correction: {}", revert);
            }
            return Err(e.into());
        }

        log::info!("Frequency correction {} -> {} ppm", previous, ppm);
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn FrequencyChangeListener>) -> ListenerId {
        self.inner.broadcaster.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.broadcaster.remove_listener(id)
    }

    pub fn center_frequency(&self) -> Hz {
        self.inner.state.lock().oscillator.center_frequency()
    }

    pub fn bandwidth(&self) -> Hz {
        self.inner.state.lock().oscillator.bandwidth()
    }

    pub fn frequency_correction(&self) -> f64 {
        self.inner.state.lock().oscillator.frequency_correction()
    }

    pub fn tunable_range(&self) -> FrequencyRange {
        self.inner.state.lock().oscillator.range()
    }

    /// Snapshot of the LO state
    pub fn oscillator(&self) -> LocalOscillatorState {
        self.inner.state.lock().oscillator.clone()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Runs `f` while no channel is admitted, holding off admissions until it
    /// returns. Gives back the channel count instead when channels are active.
    pub fn with_idle<R>(&self, f: impl FnOnce() -> R) -> std::result::Result<R, usize> {
        let state = self.inner.state.lock();
        let active = state.registry.len();
        if active > 0 {
            return Err(active);
        }
        Ok(f())
    }

    /// Snapshot of the admitted channels in registry order
    pub fn channels(&self) -> Vec<TunedChannel> {
        self.inner.state.lock().registry.snapshot()
    }

    pub fn config(&self) -> AllocatorConfig {
        self.inner.config
    }
}
