// src/event_buffer.rs
//
// Growable event list whose storage lives in an arena.
//
// The buffer itself is just a handle (allocation, length). All element
// access goes through the arena that owns the storage, which is the
// arena of the execution plan that created the buffer.

use crate::arena::{ArenaAllocation, ArenaAllocator};
use crate::error::ArenaResult;
use crate::event::{LiveEvent, RawEvent};

pub type EventArena = ArenaAllocator<RawEvent>;

#[derive(Debug)]
pub struct EventBuffer {
    allocation: ArenaAllocation,
    len: usize,
    /// Events lost because the arena could not grow this buffer.
    dropped: usize,
}

impl EventBuffer {
    /// Reserve room for `capacity` events. Control thread only.
    pub fn new(arena: &mut EventArena, capacity: usize) -> ArenaResult<Self> {
        let allocation = arena.allocate(capacity.max(1))?;
        Ok(Self {
            allocation,
            len: 0,
            dropped: 0,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.allocation.len
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Number of events dropped since the last call. Resets the count.
    #[inline]
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    /// Append an event, growing through the arena when full.
    ///
    /// Returns `false` if the event had to be dropped.
    #[inline]
    pub fn push(&mut self, arena: &mut EventArena, event: LiveEvent) -> bool {
        self.push_raw(arena, RawEvent::from(event))
    }

    fn push_raw(&mut self, arena: &mut EventArena, raw: RawEvent) -> bool {
        if self.len == self.allocation.len && !self.grow(arena) {
            self.dropped += 1;
            return false;
        }

        let len = self.len;
        arena.slice_mut(&self.allocation)[len] = raw;
        self.len += 1;
        true
    }

    /// Double the capacity. Coalesces the arena once if the first
    /// attempt finds no section large enough.
    fn grow(&mut self, arena: &mut EventArena) -> bool {
        let new_capacity = (self.allocation.len * 2).max(1);

        let allocation = match arena.allocate(new_capacity) {
            Ok(allocation) => allocation,
            Err(_) => {
                arena.coalesce();
                match arena.allocate(new_capacity) {
                    Ok(allocation) => allocation,
                    Err(_) => return false,
                }
            }
        };

        arena.copy_elements(&self.allocation, &allocation, self.len);
        let released = arena.deallocate(self.allocation.token);
        debug_assert!(released.is_ok(), "event buffer owned a dead section");

        self.allocation = allocation;
        true
    }

    /// Append every event of `other` (same arena).
    pub fn extend_from(&mut self, arena: &mut EventArena, other: &EventBuffer) {
        for i in 0..other.len {
            let raw = arena.slice(&other.allocation)[i];
            self.push_raw(arena, raw);
        }
    }

    #[inline]
    pub fn get(&self, arena: &EventArena, index: usize) -> Option<LiveEvent> {
        if index < self.len {
            Some(LiveEvent::from(arena.slice(&self.allocation)[index]))
        } else {
            None
        }
    }

    pub fn iter<'a>(&'a self, arena: &'a EventArena) -> impl Iterator<Item = LiveEvent> + 'a {
        arena.slice(&self.allocation)[..self.len]
            .iter()
            .map(|raw| LiveEvent::from(*raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn test_push_and_iterate() {
        let mut arena = EventArena::new(4096);
        let mut buffer = EventBuffer::new(&mut arena, 4).unwrap();

        buffer.push(&mut arena, LiveEvent::new(0.0, Event::note_on(60, 1.0)));
        buffer.push(&mut arena, LiveEvent::new(10.0, Event::note_off(60)));

        let events: Vec<LiveEvent> = buffer.iter(&arena).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, Event::note_off(60));
        assert_eq!(buffer.get(&arena, 0).map(|e| e.time), Some(0.0));
        assert!(buffer.get(&arena, 2).is_none());
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut arena = EventArena::new(4096);
        let mut buffer = EventBuffer::new(&mut arena, 2).unwrap();

        for i in 0..9 {
            assert!(buffer.push(&mut arena, LiveEvent::new(i as f64, Event::note_on(i, 1.0))));
        }

        assert_eq!(buffer.len(), 9);
        assert!(buffer.capacity() >= 9);
        let times: Vec<f64> = buffer.iter(&arena).map(|e| e.time).collect();
        assert_eq!(times, (0..9).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_exhausted_arena_drops_and_counts() {
        // Fits the initial four events and little else
        let mut arena = EventArena::new(160);
        let mut buffer = EventBuffer::new(&mut arena, 4).unwrap();

        let mut accepted = 0;
        for i in 0..8 {
            if buffer.push(&mut arena, LiveEvent::new(i as f64, Event::AllVoicesOff)) {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 4);
        assert_eq!(buffer.take_dropped(), 4);
        assert_eq!(buffer.take_dropped(), 0);
    }

    #[test]
    fn test_extend_from() {
        let mut arena = EventArena::new(4096);
        let mut a = EventBuffer::new(&mut arena, 4).unwrap();
        let mut b = EventBuffer::new(&mut arena, 1).unwrap();

        a.push(&mut arena, LiveEvent::new(1.0, Event::note_on(1, 1.0)));
        a.push(&mut arena, LiveEvent::new(2.0, Event::note_on(2, 1.0)));
        b.push(&mut arena, LiveEvent::new(0.0, Event::AllVoicesOff));
        b.extend_from(&mut arena, &a);

        let kinds: Vec<_> = b.iter(&arena).map(|e| e.time).collect();
        assert_eq!(kinds, vec![0.0, 1.0, 2.0]);
    }
}
