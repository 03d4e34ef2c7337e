// src/sequencer/model.rs
//
// Editable note data, owned by the control thread. The sequence
// compiler turns it into event lists; the audio thread never sees it.

use std::collections::{BTreeMap, HashMap};

use super::{ChannelId, SequenceId};

/// A note placed inside a pattern. Times are in ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub pitch: i16,
    pub velocity: f32,
    pub detune: f32,
    /// Start, relative to the pattern start.
    pub offset: i64,
    pub length: i64,
}

impl Note {
    pub fn new(pitch: i16, velocity: f32, offset: i64, length: i64) -> Self {
        Self {
            pitch,
            velocity,
            detune: 0.0,
            offset,
            length,
        }
    }

    #[inline]
    pub fn end(&self) -> i64 {
        self.offset + self.length
    }
}

/// Notes grouped by the channel that plays them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pattern {
    pub notes: HashMap<ChannelId, Vec<Note>>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_note(mut self, channel: ChannelId, note: Note) -> Self {
        self.add_note(channel, note);
        self
    }

    pub fn add_note(&mut self, channel: ChannelId, note: Note) {
        self.notes.entry(channel).or_default().push(note);
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.notes.keys().copied()
    }
}

/// The window of a pattern a clip shows, in pattern ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeView {
    pub start: i64,
    pub end: i64,
}

/// A pattern placed on an arrangement timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub pattern_id: SequenceId,
    /// Where the clip starts on the arrangement timeline.
    pub offset: i64,
    /// Without a view the whole pattern plays.
    pub time_view: Option<TimeView>,
}

impl Clip {
    pub fn new(pattern_id: SequenceId, offset: i64) -> Self {
        Self {
            pattern_id,
            offset,
            time_view: None,
        }
    }

    pub fn with_time_view(mut self, start: i64, end: i64) -> Self {
        self.time_view = Some(TimeView { start, end });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arrangement {
    /// Keyed by clip id.
    pub clips: BTreeMap<u64, Clip>,
}

impl Arrangement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, id: u64, clip: Clip) -> Self {
        self.clips.insert(id, clip);
        self
    }
}

/// Every pattern and arrangement, sharing one id space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceModel {
    pub patterns: HashMap<SequenceId, Pattern>,
    pub arrangements: HashMap<SequenceId, Arrangement>,
}

impl SequenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(&self, id: SequenceId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn arrangement(&self, id: SequenceId) -> Option<&Arrangement> {
        self.arrangements.get(&id)
    }

    pub fn is_arrangement(&self, id: SequenceId) -> bool {
        self.arrangements.contains_key(&id)
    }
}
