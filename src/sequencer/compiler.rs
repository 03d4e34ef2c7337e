// src/sequencer/compiler.rs
//
// Turns patterns and arrangements into per-channel, time-sorted event
// lists. Pure functions over the model; run on the control thread.

use std::collections::HashMap;

use super::model::{Note, SequenceModel};
use super::store::SequenceEventList;
use super::time::SequenceTime;
use super::{ChannelId, SequenceId};
use crate::error::{SequenceError, SequenceResult};
use crate::event::Event;

/// An event at a position in musical time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceEvent {
    pub time: SequenceTime,
    pub event: Event,
}

/// Compiled lists for one sequence, keyed by channel.
pub type CompiledChannels = HashMap<ChannelId, SequenceEventList>;

/// Compile whichever pattern or arrangement has `id`.
pub fn compile_sequence(
    model: &SequenceModel,
    id: SequenceId,
    channels: Option<&[ChannelId]>,
) -> SequenceResult<CompiledChannels> {
    if model.is_arrangement(id) {
        compile_arrangement(model, id, channels)
    } else if model.pattern(id).is_some() {
        compile_pattern(model, id, channels)
    } else {
        Err(SequenceError::UnknownSequence(id))
    }
}

/// Compile a pattern, optionally only for a subset of channels.
///
/// Every requested channel gets a list, empty if the pattern has no notes
/// for it, so a rebuild can clear a channel.
pub fn compile_pattern(
    model: &SequenceModel,
    pattern_id: SequenceId,
    channels: Option<&[ChannelId]>,
) -> SequenceResult<CompiledChannels> {
    let pattern = model
        .pattern(pattern_id)
        .ok_or(SequenceError::UnknownPattern(pattern_id))?;

    let mut compiled = requested_channels(channels);

    for (&channel, notes) in &pattern.notes {
        if !is_requested(channels, channel) {
            continue;
        }
        let list = compiled.entry(channel).or_default();
        compile_notes(notes, None, None, &mut list.events);
    }

    for list in compiled.values_mut() {
        sort_event_list(&mut list.events);
    }

    Ok(compiled)
}

/// Compile every clip of an arrangement onto one timeline per channel.
pub fn compile_arrangement(
    model: &SequenceModel,
    arrangement_id: SequenceId,
    channels: Option<&[ChannelId]>,
) -> SequenceResult<CompiledChannels> {
    let arrangement = model
        .arrangement(arrangement_id)
        .ok_or(SequenceError::UnknownArrangement(arrangement_id))?;

    let mut compiled = requested_channels(channels);

    for clip in arrangement.clips.values() {
        let pattern = model
            .pattern(clip.pattern_id)
            .ok_or(SequenceError::UnknownPattern(clip.pattern_id))?;

        let range = clip
            .time_view
            .map(|view| (SequenceTime::from_ticks(view.start), SequenceTime::from_ticks(view.end)));
        let offset = SequenceTime::from_ticks(clip.offset);

        for (&channel, notes) in &pattern.notes {
            if !is_requested(channels, channel) {
                continue;
            }
            let list = compiled.entry(channel).or_default();
            compile_notes(notes, range, Some(offset), &mut list.events);
        }
    }

    for list in compiled.values_mut() {
        sort_event_list(&mut list.events);
    }

    log::debug!(
        "Compiled arrangement {} ({} clips, {} channels)",
        arrangement_id,
        arrangement.clips.len(),
        compiled.len()
    );

    Ok(compiled)
}

fn requested_channels(channels: Option<&[ChannelId]>) -> CompiledChannels {
    channels
        .unwrap_or_default()
        .iter()
        .map(|&c| (c, SequenceEventList::default()))
        .collect()
}

#[inline]
fn is_requested(channels: Option<&[ChannelId]>, channel: ChannelId) -> bool {
    channels.is_none_or(|c| c.contains(&channel))
}

/// Emit a NoteOn/NoteOff pair per note into `out` (unsorted).
///
/// Notes are clamped to `range` and re-based so the range start is time
/// zero, then shifted by the whole ticks of `offset`.
pub fn compile_notes(
    notes: &[Note],
    range: Option<(SequenceTime, SequenceTime)>,
    offset: Option<SequenceTime>,
    out: &mut Vec<SequenceEvent>,
) {
    let base = range.map(|(start, _)| start).unwrap_or(SequenceTime::ZERO);
    let shift = SequenceTime::from_ticks(offset.map(|o| o.ticks).unwrap_or(0));

    for note in notes {
        let start = SequenceTime::from_ticks(note.offset);
        let end = SequenceTime::from_ticks(note.end());

        let Some((start, end)) = clamp_note(start, end, range) else {
            continue;
        };

        // A zero-length note would sort its NoteOff before its NoteOn
        if end <= start {
            continue;
        }

        out.push(SequenceEvent {
            time: start - base + shift,
            event: Event::NoteOn {
                pitch: note.pitch,
                channel: 0,
                velocity: note.velocity,
                detune: note.detune,
                id: -1,
            },
        });
        out.push(SequenceEvent {
            time: end - base + shift,
            event: Event::NoteOff {
                pitch: note.pitch,
                channel: 0,
                velocity: 0.0,
                id: -1,
            },
        });
    }
}

/// Clamp `[start, end)` to `range`.
///
/// Returns `None` if the span lies entirely outside the range. Without a
/// range the span is returned as is.
pub fn clamp_note(
    start: SequenceTime,
    end: SequenceTime,
    range: Option<(SequenceTime, SequenceTime)>,
) -> Option<(SequenceTime, SequenceTime)> {
    let Some((range_start, range_end)) = range else {
        return Some((start, end));
    };

    if end <= range_start || start >= range_end {
        return None;
    }

    Some((start.max(range_start), end.min(range_end)))
}

/// Sort by time. At equal times `NoteOff` goes before `NoteOn`, so a note
/// ending where another begins never retriggers twice.
pub fn sort_event_list(events: &mut [SequenceEvent]) {
    events.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then_with(|| a.event.kind().cmp(&b.event.kind()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::sequencer::model::{Arrangement, Clip, Pattern};
    use proptest::prelude::*;

    const CHANNEL: ChannelId = 1;

    fn single_note() -> Vec<Note> {
        vec![Note::new(60, 0.8, 10, 10)]
    }

    fn times(events: &[SequenceEvent]) -> Vec<(EventKind, SequenceTime)> {
        events.iter().map(|e| (e.event.kind(), e.time)).collect()
    }

    #[test]
    fn test_note_without_range_or_offset() {
        let mut events = Vec::new();
        compile_notes(&single_note(), None, None, &mut events);

        assert_eq!(
            times(&events),
            vec![
                (EventKind::NoteOn, SequenceTime::new(10, 0.0)),
                (EventKind::NoteOff, SequenceTime::new(20, 0.0)),
            ]
        );
    }

    #[test]
    fn test_offset_applies_whole_ticks() {
        let mut events = Vec::new();
        compile_notes(&single_note(), None, Some(SequenceTime::new(5, 0.5)), &mut events);

        assert_eq!(
            times(&events),
            vec![
                (EventKind::NoteOn, SequenceTime::new(15, 0.0)),
                (EventKind::NoteOff, SequenceTime::new(25, 0.0)),
            ]
        );
    }

    #[test]
    fn test_range_clamps_and_rebases() {
        let mut events = Vec::new();
        let range = (SequenceTime::new(5, 0.5), SequenceTime::new(15, 0.5));
        compile_notes(&single_note(), Some(range), None, &mut events);

        assert_eq!(
            times(&events),
            vec![
                (EventKind::NoteOn, SequenceTime::new(4, 0.5)),
                (EventKind::NoteOff, SequenceTime::new(10, 0.0)),
            ]
        );
    }

    #[test]
    fn test_note_outside_range_is_dropped() {
        let mut events = Vec::new();
        let range = (SequenceTime::new(50, 0.5), SequenceTime::new(60, 0.5));
        compile_notes(&single_note(), Some(range), None, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_clamp_round_trip_when_range_contains_note() {
        let start = SequenceTime::new(10, 0.0);
        let end = SequenceTime::new(20, 0.0);

        let ranges = [
            (SequenceTime::new(0, 0.0), SequenceTime::new(100, 0.0)),
            (SequenceTime::new(10, 0.0), SequenceTime::new(20, 0.0)),
            (SequenceTime::new(10, 0.0), SequenceTime::new(30, 0.0)),
            (SequenceTime::new(5, 0.0), SequenceTime::new(20, 0.0)),
        ];
        for range in ranges {
            assert_eq!(clamp_note(start, end, Some(range)), Some((start, end)));
        }

        assert_eq!(clamp_note(start, end, None), Some((start, end)));
        assert_eq!(
            clamp_note(start, end, Some((SequenceTime::new(15, 0.0), SequenceTime::new(30, 0.0)))),
            Some((SequenceTime::new(15, 0.0), end))
        );
        assert_eq!(
            clamp_note(start, end, Some((SequenceTime::new(20, 0.0), SequenceTime::new(30, 0.0)))),
            None
        );
    }

    #[test]
    fn test_note_off_sorts_before_note_on_at_same_time() {
        let notes = vec![Note::new(62, 1.0, 20, 5), Note::new(60, 1.0, 10, 10)];
        let mut events = Vec::new();
        compile_notes(&notes, None, None, &mut events);
        sort_event_list(&mut events);

        assert_eq!(
            times(&events),
            vec![
                (EventKind::NoteOn, SequenceTime::new(10, 0.0)),
                (EventKind::NoteOff, SequenceTime::new(20, 0.0)),
                (EventKind::NoteOn, SequenceTime::new(20, 0.0)),
                (EventKind::NoteOff, SequenceTime::new(25, 0.0)),
            ]
        );
    }

    #[test]
    fn test_compile_pattern_channel_subset() {
        let mut model = SequenceModel::new();
        model.patterns.insert(
            7,
            Pattern::new()
                .with_note(1, Note::new(60, 1.0, 0, 4))
                .with_note(2, Note::new(64, 1.0, 0, 4)),
        );

        let all = compile_pattern(&model, 7, None).unwrap();
        assert_eq!(all.len(), 2);

        let subset = compile_pattern(&model, 7, Some(&[2, 3])).unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(subset[&2].events.len(), 2);
        assert!(subset[&3].events.is_empty());

        assert_eq!(
            compile_pattern(&model, 8, None).unwrap_err(),
            SequenceError::UnknownPattern(8)
        );
    }

    #[test]
    fn test_compile_arrangement_places_clips() {
        let mut model = SequenceModel::new();
        model
            .patterns
            .insert(1, Pattern::new().with_note(CHANNEL, Note::new(60, 1.0, 10, 10)));
        model.arrangements.insert(
            100,
            Arrangement::new()
                .with_clip(1, Clip::new(1, 0))
                .with_clip(2, Clip::new(1, 96).with_time_view(15, 40)),
        );

        let compiled = compile_sequence(&model, 100, None).unwrap();
        let list = &compiled[&CHANNEL].events;

        assert_eq!(
            times(list),
            vec![
                (EventKind::NoteOn, SequenceTime::from_ticks(10)),
                (EventKind::NoteOff, SequenceTime::from_ticks(20)),
                (EventKind::NoteOn, SequenceTime::from_ticks(96)),
                (EventKind::NoteOff, SequenceTime::from_ticks(101)),
            ]
        );

        assert_eq!(
            compile_sequence(&model, 5, None).unwrap_err(),
            SequenceError::UnknownSequence(5)
        );
    }

    #[test]
    fn test_arrangement_with_missing_pattern() {
        let mut model = SequenceModel::new();
        model
            .arrangements
            .insert(100, Arrangement::new().with_clip(1, Clip::new(9, 0)));

        assert_eq!(
            compile_arrangement(&model, 100, None).unwrap_err(),
            SequenceError::UnknownPattern(9)
        );
    }

    proptest! {
        #[test]
        fn prop_compiled_lists_are_sorted(
            notes in prop::collection::vec((0i16..128, 0i64..200, 1i64..50), 0..40)
        ) {
            let notes: Vec<Note> = notes
                .into_iter()
                .map(|(pitch, offset, length)| Note::new(pitch, 1.0, offset, length))
                .collect();

            let mut events = Vec::new();
            compile_notes(&notes, None, None, &mut events);
            sort_event_list(&mut events);

            prop_assert_eq!(events.len(), notes.len() * 2);
            for pair in events.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(
                    a.time < b.time || (a.time == b.time && a.event.kind() <= b.event.kind())
                );
            }
        }
    }
}
