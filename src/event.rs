// src/event.rs

use bytemuck::{Pod, Zeroable};

/// ===============================
/// Note events
/// ===============================

/// A note or voice-management event.
///
/// Variants are declared in sort order: at equal times `AllVoicesOff`
/// comes first, then `NoteOff`, then `NoteOn`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Silence every sounding voice (transport stop, jump or loop wrap).
    AllVoicesOff,

    NoteOff {
        pitch: i16,
        channel: i16,
        velocity: f32,
        /// Matches the `id` of the NoteOn this ends, or -1.
        id: i32,
    },

    NoteOn {
        pitch: i16,
        channel: i16,
        velocity: f32,
        detune: f32,
        /// Note identity for per-note expression, or -1.
        id: i32,
    },
}

impl Event {
    pub fn note_on(pitch: i16, velocity: f32) -> Self {
        Event::NoteOn {
            pitch,
            channel: 0,
            velocity,
            detune: 0.0,
            id: -1,
        }
    }

    pub fn note_off(pitch: i16) -> Self {
        Event::NoteOff {
            pitch,
            channel: 0,
            velocity: 0.0,
            id: -1,
        }
    }

    /// Rank used to order events that share a timestamp.
    #[inline]
    pub fn kind(&self) -> EventKind {
        match self {
            Event::AllVoicesOff => EventKind::AllVoicesOff,
            Event::NoteOff { .. } => EventKind::NoteOff,
            Event::NoteOn { .. } => EventKind::NoteOn,
        }
    }
}

/// Discriminant of [`Event`], ordered for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum EventKind {
    AllVoicesOff = 0,
    NoteOff = 1,
    NoteOn = 2,
}

/// An event placed inside the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveEvent {
    /// Offset from the start of the block, in samples.
    pub time: f64,
    pub event: Event,
}

impl LiveEvent {
    pub fn new(time: f64, event: Event) -> Self {
        Self { time, event }
    }
}

/// ===============================
/// Arena storage form
/// ===============================

/// Flat, plain-old-data encoding of a [`LiveEvent`].
///
/// Event buffers live in a byte arena, so they store this record and
/// convert at the edges.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawEvent {
    pub time: f64,
    pub kind: u32,
    pub pitch: i16,
    pub channel: i16,
    pub velocity: f32,
    pub detune: f32,
    pub id: i32,
    _pad: u32,
}

impl From<LiveEvent> for RawEvent {
    fn from(live: LiveEvent) -> Self {
        let mut raw = RawEvent {
            time: live.time,
            kind: live.event.kind() as u32,
            ..RawEvent::zeroed()
        };

        match live.event {
            Event::AllVoicesOff => {}
            Event::NoteOff {
                pitch,
                channel,
                velocity,
                id,
            } => {
                raw.pitch = pitch;
                raw.channel = channel;
                raw.velocity = velocity;
                raw.id = id;
            }
            Event::NoteOn {
                pitch,
                channel,
                velocity,
                detune,
                id,
            } => {
                raw.pitch = pitch;
                raw.channel = channel;
                raw.velocity = velocity;
                raw.detune = detune;
                raw.id = id;
            }
        }

        raw
    }
}

impl From<RawEvent> for LiveEvent {
    fn from(raw: RawEvent) -> Self {
        let event = match raw.kind {
            k if k == EventKind::NoteOn as u32 => Event::NoteOn {
                pitch: raw.pitch,
                channel: raw.channel,
                velocity: raw.velocity,
                detune: raw.detune,
                id: raw.id,
            },
            k if k == EventKind::NoteOff as u32 => Event::NoteOff {
                pitch: raw.pitch,
                channel: raw.channel,
                velocity: raw.velocity,
                id: raw.id,
            },
            _ => Event::AllVoicesOff,
        };

        LiveEvent {
            time: raw.time,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_layout() {
        assert_eq!(std::mem::size_of::<RawEvent>(), 32);
        assert_eq!(std::mem::align_of::<RawEvent>(), 8);
    }

    #[test]
    fn test_kind_order() {
        assert!(EventKind::AllVoicesOff < EventKind::NoteOff);
        assert!(EventKind::NoteOff < EventKind::NoteOn);
        assert_eq!(Event::note_off(60).kind(), EventKind::NoteOff);
    }

    #[test]
    fn test_raw_conversion_keeps_payload() {
        let live = LiveEvent::new(
            12.5,
            Event::NoteOn {
                pitch: 64,
                channel: 3,
                velocity: 0.75,
                detune: -0.1,
                id: 9,
            },
        );
        assert_eq!(LiveEvent::from(RawEvent::from(live)), live);

        let off = LiveEvent::new(0.0, Event::AllVoicesOff);
        assert_eq!(LiveEvent::from(RawEvent::from(off)), off);
    }
}
