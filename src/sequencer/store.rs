// src/sequencer/store.rs
//
// Compiled event lists shared with the audio thread.
//
// The control thread never edits a map the audio thread can see. Every
// edit clones the outer map (and the touched channel map), publishes the
// clone, and parks whatever the edit replaced under the address of the
// map that was current at the time. When the audio thread hands that
// map back, everything parked under it is dropped with it.

use std::collections::HashMap;
use std::sync::Arc;

use super::compiler::{CompiledChannels, SequenceEvent};
use super::{ChannelId, SequenceId};
use crate::handoff::{handoff, HandoffReceiver, HandoffSender};

/// Time-sorted events for one channel of one sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceEventList {
    pub events: Vec<SequenceEvent>,
}

pub type ChannelEventMap = HashMap<ChannelId, Arc<SequenceEventList>>;

/// Every channel's events for one pattern or arrangement.
#[derive(Debug, Clone, Default)]
pub struct SequenceEventListCollection {
    pub channels: Arc<ChannelEventMap>,
}

impl SequenceEventListCollection {
    pub fn from_compiled(compiled: CompiledChannels) -> Self {
        Self {
            channels: Arc::new(
                compiled
                    .into_iter()
                    .map(|(channel, list)| (channel, Arc::new(list)))
                    .collect(),
            ),
        }
    }

    pub fn channel(&self, channel: ChannelId) -> Option<&SequenceEventList> {
        self.channels.get(&channel).map(Arc::as_ref)
    }
}

pub type SequenceMap = HashMap<SequenceId, SequenceEventListCollection>;

/// Data replaced by an edit, held until the map it belonged to returns.
#[derive(Debug)]
enum Retired {
    Collection(SequenceEventListCollection),
    Channel {
        list: Option<Arc<SequenceEventList>>,
        /// Only held so it is dropped on the control thread.
        _channels: Arc<ChannelEventMap>,
    },
}

impl Retired {
    fn list_count(&self) -> usize {
        match self {
            Retired::Collection(collection) => collection.channels.len(),
            Retired::Channel { list, .. } => usize::from(list.is_some()),
        }
    }
}

/// Create the control and audio ends of the store.
pub fn sequence_store(capacity: usize) -> (SequenceStore, RtSequenceStore) {
    let (sender, receiver) = handoff(capacity);
    let initial = Arc::new(SequenceMap::new());

    (
        SequenceStore {
            sender,
            current: Arc::clone(&initial),
            pending: HashMap::new(),
        },
        RtSequenceStore {
            receiver,
            active: Some(initial),
            empty: SequenceMap::new(),
            maps_adopted: 0,
        },
    )
}

//
// ===============================
// MARK: Control thread
// ===============================
//

/// Control-thread end. NOT real-time safe.
pub struct SequenceStore {
    sender: HandoffSender<Arc<SequenceMap>>,
    current: Arc<SequenceMap>,
    /// Keyed by the address of the outer map the data was reachable from.
    pending: HashMap<usize, Vec<Retired>>,
}

impl SequenceStore {
    /// The latest published map.
    #[inline]
    pub fn current(&self) -> &SequenceMap {
        &self.current
    }

    pub fn add_or_update_sequence(&mut self, id: SequenceId, collection: SequenceEventListCollection) {
        let mut next = SequenceMap::clone(&self.current);
        let retired = next.insert(id, collection).map(Retired::Collection);
        self.publish(next, retired);
    }

    pub fn add_or_update_channel_in_sequence(
        &mut self,
        id: SequenceId,
        channel: ChannelId,
        list: SequenceEventList,
    ) {
        let mut next = SequenceMap::clone(&self.current);
        let collection = next.entry(id).or_default();

        let mut channels = ChannelEventMap::clone(&collection.channels);
        let list = channels.insert(channel, Arc::new(list));
        let channels = std::mem::replace(&mut collection.channels, Arc::new(channels));

        self.publish(
            next,
            Some(Retired::Channel {
                list,
                _channels: channels,
            }),
        );
    }

    /// No-op if the sequence does not exist.
    pub fn remove_sequence(&mut self, id: SequenceId) {
        if !self.current.contains_key(&id) {
            return;
        }

        let mut next = SequenceMap::clone(&self.current);
        let retired = next.remove(&id).map(Retired::Collection);
        self.publish(next, retired);
    }

    /// No-op if the sequence has no list for the channel.
    pub fn remove_channel_from_sequence(&mut self, id: SequenceId, channel: ChannelId) {
        let has_channel = self
            .current
            .get(&id)
            .is_some_and(|c| c.channels.contains_key(&channel));
        if !has_channel {
            return;
        }

        let mut next = SequenceMap::clone(&self.current);
        let retired = next.get_mut(&id).map(|collection| remove_channel(collection, channel));
        self.publish(next, retired);
    }

    /// Drop a channel from every sequence in a single update.
    pub fn remove_channel_from_all_sequences(&mut self, channel: ChannelId) {
        let affected: Vec<SequenceId> = self
            .current
            .iter()
            .filter(|(_, c)| c.channels.contains_key(&channel))
            .map(|(&id, _)| id)
            .collect();
        if affected.is_empty() {
            return;
        }

        let mut next = SequenceMap::clone(&self.current);
        let mut retired = Vec::with_capacity(affected.len());
        for id in affected {
            if let Some(collection) = next.get_mut(&id) {
                retired.push(remove_channel(collection, channel));
            }
        }
        self.publish(next, retired);
    }

    /// Remove all compiled data for a channel that no longer exists.
    pub fn clean_up_channel(&mut self, channel: ChannelId) {
        self.remove_channel_from_all_sequences(channel);
    }

    fn publish(&mut self, next: SequenceMap, retired: impl IntoIterator<Item = Retired>) {
        let previous = std::mem::replace(&mut self.current, Arc::new(next));

        // The audio thread may still hold `previous`; park by its address
        let key = Arc::as_ptr(&previous) as usize;
        self.pending.entry(key).or_default().extend(retired);

        if !self.sender.send_or_queue(Arc::clone(&self.current)) {
            log::warn!(
                "Sequence queue is full; {} updates waiting",
                self.sender.backlog_len()
            );
        }
    }

    /// Drop maps the audio thread has returned, and everything parked
    /// under them. Returns how many maps were reclaimed.
    pub fn reclaim(&mut self) -> usize {
        self.sender.flush_backlog();

        let mut maps = 0;
        let mut lists = 0;
        while let Some(map) = self.sender.next_returned() {
            let key = Arc::as_ptr(&map) as usize;
            if let Some(retired) = self.pending.remove(&key) {
                lists += retired.iter().map(Retired::list_count).sum::<usize>();
            }
            drop(map);
            maps += 1;
        }

        if maps > 0 {
            log::debug!("Reclaimed {} sequence maps ({} event lists)", maps, lists);
        }
        maps
    }

    /// Number of superseded maps whose parked data is still waiting.
    pub fn pending_deletions(&self) -> usize {
        self.pending.len()
    }
}

fn remove_channel(collection: &mut SequenceEventListCollection, channel: ChannelId) -> Retired {
    let mut channels = ChannelEventMap::clone(&collection.channels);
    let list = channels.remove(&channel);
    let channels = std::mem::replace(&mut collection.channels, Arc::new(channels));
    Retired::Channel {
        list,
        _channels: channels,
    }
}

//
// ===============================
// MARK: Audio thread
// ===============================
//

/// Audio-thread end. Never allocates or frees.
pub struct RtSequenceStore {
    receiver: HandoffReceiver<Arc<SequenceMap>>,
    active: Option<Arc<SequenceMap>>,
    /// Returned if the active map was ever missing. Never holds entries.
    empty: SequenceMap,
    maps_adopted: u64,
}

impl RtSequenceStore {
    /// Adopt pending updates, retiring each replaced map, and return the
    /// newest map.
    pub fn rt_get_event_lists(&mut self) -> &SequenceMap {
        let adoption = self.receiver.adopt(&mut self.active, 0);
        self.maps_adopted += adoption.adopted as u64;

        match &self.active {
            Some(map) => map,
            None => &self.empty,
        }
    }

    #[inline]
    pub fn rt_maps_adopted(&self) -> u64 {
        self.maps_adopted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::sequencer::SequenceTime;

    fn list(pitch: i16) -> SequenceEventList {
        SequenceEventList {
            events: vec![SequenceEvent {
                time: SequenceTime::from_ticks(0),
                event: Event::note_on(pitch, 1.0),
            }],
        }
    }

    #[test]
    fn test_channel_edit_is_copy_on_write() {
        let (mut store, mut rt) = sequence_store(8);
        let old = Arc::downgrade(&store.current);
        let old_ptr = store.current() as *const SequenceMap;

        store.add_or_update_channel_in_sequence(1, 10, list(60));

        assert_ne!(store.current() as *const SequenceMap, old_ptr);
        assert_eq!(store.pending_deletions(), 1);
        assert!(old.upgrade().is_some());

        // The audio thread swaps and returns the old map
        let seen = rt.rt_get_event_lists();
        assert_eq!(seen[&1].channel(10), Some(&list(60)));
        assert_eq!(rt.rt_maps_adopted(), 1);
        assert!(old.upgrade().is_some());

        assert_eq!(store.reclaim(), 1);
        assert_eq!(store.pending_deletions(), 0);
        assert!(old.upgrade().is_none());
    }

    #[test]
    fn test_replaced_channel_stays_alive_until_reclaimed() {
        let (mut store, mut rt) = sequence_store(8);
        store.add_or_update_channel_in_sequence(1, 10, list(60));
        rt.rt_get_event_lists();
        store.reclaim();

        let first = Arc::downgrade(&store.current()[&1].channels[&10]);
        store.add_or_update_channel_in_sequence(1, 10, list(62));
        assert!(first.upgrade().is_some());

        rt.rt_get_event_lists();
        store.reclaim();
        assert!(first.upgrade().is_none());
    }

    #[test]
    fn test_untouched_channels_are_shared() {
        let (mut store, _rt) = sequence_store(8);
        store.add_or_update_channel_in_sequence(1, 10, list(60));
        store.add_or_update_channel_in_sequence(1, 11, list(61));

        let before = Arc::clone(&store.current()[&1].channels[&10]);
        store.add_or_update_channel_in_sequence(1, 11, list(65));
        assert!(Arc::ptr_eq(&before, &store.current()[&1].channels[&10]));
    }

    #[test]
    fn test_remove_operations() {
        let (mut store, mut rt) = sequence_store(8);
        let mut compiled = CompiledChannels::new();
        compiled.insert(10, list(60));
        compiled.insert(11, list(61));
        store.add_or_update_sequence(1, SequenceEventListCollection::from_compiled(compiled.clone()));
        store.add_or_update_sequence(2, SequenceEventListCollection::from_compiled(compiled));

        store.remove_channel_from_sequence(1, 11);
        assert!(store.current()[&1].channel(11).is_none());
        assert!(store.current()[&2].channel(11).is_some());

        store.clean_up_channel(10);
        assert!(store.current()[&1].channel(10).is_none());
        assert!(store.current()[&2].channel(10).is_none());

        store.remove_sequence(2);
        assert!(!store.current().contains_key(&2));

        // Removing what is not there publishes nothing
        let pending = store.pending_deletions();
        store.remove_sequence(2);
        store.remove_channel_from_sequence(1, 99);
        assert_eq!(store.pending_deletions(), pending);

        assert!(rt.rt_get_event_lists().get(&2).is_none());
        assert_eq!(store.reclaim(), 5);
        assert_eq!(store.pending_deletions(), 0);
    }

    #[test]
    fn test_full_queue_keeps_updates_in_order() {
        let (mut store, mut rt) = sequence_store(1);

        store.add_or_update_channel_in_sequence(1, 10, list(60));
        store.add_or_update_channel_in_sequence(1, 10, list(61));
        store.add_or_update_channel_in_sequence(1, 10, list(62));

        for _ in 0..4 {
            rt.rt_get_event_lists();
            store.reclaim();
        }

        assert_eq!(rt.rt_get_event_lists()[&1].channel(10), Some(&list(62)));
        assert_eq!(store.pending_deletions(), 0);
    }
}
