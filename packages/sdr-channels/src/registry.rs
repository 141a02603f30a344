// Channel registry - admitted channels ordered by lower edge
//
// Ordering is restored after every insert and remove; the locked span is
// derived from the whole set rather than its last entry.

use crate::types::{Channel, ChannelId, Hz, TunedChannel};

/// Admitted channels, kept sorted by `(min_frequency, id)` after every change.
#[derive(Debug, Default, Clone)]
pub struct ChannelRegistry {
    channels: Vec<TunedChannel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ChannelId, channel: Channel) {
        let key = (channel.min_frequency(), id);
        let position = self
            .channels
            .partition_point(|tuned| (tuned.channel.min_frequency(), tuned.id) < key);
        self.channels.insert(position, TunedChannel { id, channel });
        log::debug!("Registry insert {} at position {}", id, position);
    }

    /// Removes by identity, never by value.
    pub fn remove(&mut self, id: ChannelId) -> Option<Channel> {
        let position = self.channels.iter().position(|tuned| tuned.id == id)?;
        Some(self.channels.remove(position).channel)
    }

    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|tuned| tuned.id == id)
            .map(|tuned| &tuned.channel)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn first(&self) -> Option<&TunedChannel> {
        self.channels.first()
    }

    pub fn last(&self) -> Option<&TunedChannel> {
        self.channels.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TunedChannel> {
        self.channels.iter()
    }

    /// Lowest minimum and highest maximum over all locked channels.
    ///
    /// The highest maximum is scanned rather than read from the last entry:
    /// a wide channel sorted early can reach past a narrow one sorted later.
    pub fn locked_span(&self) -> Option<(Hz, Hz)> {
        let first = self.channels.first()?;
        let max_locked = self
            .channels
            .iter()
            .map(|tuned| tuned.channel.max_frequency())
            .max()
            .unwrap_or_else(|| first.channel.max_frequency());
        Some((first.channel.min_frequency(), max_locked))
    }

    /// Re-establishes the sort order. Inserts already keep it; retuning calls
    /// this before reading the extremes.
    pub fn sort(&mut self) {
        self.channels
            .sort_by_key(|tuned| (tuned.channel.min_frequency(), tuned.id));
    }

    pub fn snapshot(&self) -> Vec<TunedChannel> {
        self.channels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(center: Hz, bandwidth: Hz) -> Channel {
        Channel::new(center, bandwidth).unwrap()
    }

    #[test]
    fn test_insert_keeps_sorted_by_min_frequency() {
        let mut registry = ChannelRegistry::new();
        registry.insert(ChannelId(1), ch(3_000, 100));
        registry.insert(ChannelId(2), ch(1_000, 100));
        registry.insert(ChannelId(3), ch(2_000, 100));

        let ids: Vec<u64> = registry.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(registry.first().unwrap().id, ChannelId(2));
        assert_eq!(registry.last().unwrap().id, ChannelId(1));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut registry = ChannelRegistry::new();
        registry.insert(ChannelId(5), ch(1_000, 100));
        registry.insert(ChannelId(6), ch(1_000, 100));
        registry.insert(ChannelId(7), ch(1_010, 120));

        let ids: Vec<u64> = registry.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_remove_by_identity() {
        let mut registry = ChannelRegistry::new();
        let channel = ch(1_000, 100);
        registry.insert(ChannelId(1), channel);
        registry.insert(ChannelId(2), channel);

        assert_eq!(registry.remove(ChannelId(2)), Some(channel));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ChannelId(1)));
        assert!(!registry.contains(ChannelId(2)));
        assert_eq!(registry.remove(ChannelId(2)), None);
    }

    #[test]
    fn test_locked_span_uses_widest_maximum() {
        let mut registry = ChannelRegistry::new();
        assert_eq!(registry.locked_span(), None);

        registry.insert(ChannelId(1), ch(1_000, 1_000)); // 500..1500
        registry.insert(ChannelId(2), ch(1_000, 200)); // 900..1100
        assert_eq!(registry.last().unwrap().id, ChannelId(2));
        assert_eq!(registry.locked_span(), Some((500, 1_500)));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut registry = ChannelRegistry::new();
        registry.insert(ChannelId(1), ch(1_000, 100));
        let snapshot = registry.snapshot();
        registry.remove(ChannelId(1));
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}
