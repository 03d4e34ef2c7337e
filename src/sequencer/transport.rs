// src/sequencer/transport.rs
//
// Playhead and tempo state.
//
// The control thread owns `Transport` and publishes its config through a
// double-buffered cell. The audio thread owns `RtTransport`, reads the
// config at the top of each block and moves the playhead at the end.
// Playhead jumps travel separately through a handoff queue because they
// carry note data.

use std::collections::HashMap;

use super::model::{Pattern, SequenceModel};
use super::{ChannelId, SequenceId};
use crate::double_buffer::{double_buffered, CellReader, CellWriter};
use crate::event::{Event, LiveEvent};
use crate::handoff::{handoff, HandoffReceiver, HandoffSender};

/// Jump queue size used by [`transport`].
pub const DEFAULT_JUMP_QUEUE_CAPACITY: usize = 64;

/// Everything the audio thread needs to move the playhead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportConfig {
    pub bpm: f64,
    pub ticks_per_quarter: i64,
    pub active_sequence: Option<SequenceId>,
    pub is_playing: bool,

    /// Where the playhead returns on stop, in ticks.
    pub playhead_start: f64,

    /// Loop bounds in ticks. `loop_end` is infinite when there is no loop.
    pub loop_start: f64,
    pub loop_end: f64,

    pub sample_rate: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            ticks_per_quarter: 96,
            active_sequence: None,
            is_playing: false,
            playhead_start: 0.0,
            loop_start: 0.0,
            loop_end: f64::INFINITY,
            sample_rate: 48_000.0,
        }
    }
}

impl TransportConfig {
    #[inline]
    pub fn has_loop(&self) -> bool {
        self.loop_end.is_finite() && self.loop_end > self.loop_start
    }

    /// Musical ticks that pass per audio sample at the current tempo.
    #[inline]
    pub fn ticks_per_sample(&self) -> f64 {
        let ticks_per_second = self.ticks_per_quarter as f64 * self.bpm / 60.0;
        ticks_per_second / self.sample_rate
    }
}

//
// ===============================
// MARK: Playhead jumps
// ===============================
//

/// A request to move the playhead, plus the notes that should already be
/// sounding at the new position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayheadJumpEvent {
    pub new_playhead_position: f64,
    pub events_to_play_at_jump: HashMap<ChannelId, Vec<LiveEvent>>,
}

impl PlayheadJumpEvent {
    /// Build a jump to `position` in `sequence`.
    ///
    /// Notes that start exactly at `position` are left out; the
    /// sequencer picks those up itself.
    pub fn new(position: f64, sequence: Option<SequenceId>, model: &SequenceModel) -> Self {
        let mut event = PlayheadJumpEvent {
            new_playhead_position: position,
            events_to_play_at_jump: HashMap::new(),
        };

        let Some(id) = sequence else {
            return event;
        };

        if let Some(pattern) = model.pattern(id) {
            event.add_sounding_notes(pattern, position);
        }

        if let Some(arrangement) = model.arrangement(id) {
            for clip in arrangement.clips.values() {
                let offset = clip.offset as f64;
                if position < offset {
                    continue;
                }

                let position_in_pattern = match clip.time_view {
                    Some(view) => {
                        if position >= offset + (view.end - view.start) as f64 {
                            continue;
                        }
                        position - offset + view.start as f64
                    }
                    None => position - offset,
                };

                if let Some(pattern) = model.pattern(clip.pattern_id) {
                    event.add_sounding_notes(pattern, position_in_pattern);
                }
            }
        }

        event
    }

    fn add_sounding_notes(&mut self, pattern: &Pattern, position: f64) {
        for (&channel, notes) in &pattern.notes {
            for note in notes {
                if (note.offset as f64) < position && (note.end() as f64) > position {
                    self.events_to_play_at_jump.entry(channel).or_default().push(LiveEvent::new(
                        0.0,
                        Event::NoteOn {
                            pitch: note.pitch,
                            channel: 0,
                            velocity: note.velocity,
                            detune: note.detune,
                            id: -1,
                        },
                    ));
                }
            }
        }
    }

    pub fn events_for_channel(&self, channel: ChannelId) -> &[LiveEvent] {
        self.events_to_play_at_jump
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Create the control and audio ends of the transport.
pub fn transport(config: TransportConfig) -> (Transport, RtTransport) {
    transport_with_capacity(config, DEFAULT_JUMP_QUEUE_CAPACITY)
}

pub fn transport_with_capacity(
    config: TransportConfig,
    jump_queue_capacity: usize,
) -> (Transport, RtTransport) {
    let (cell, reader) = double_buffered(config);
    // Reserve one retirement slot for the jump an audio block is holding
    let (jumps, rt_jumps) = handoff(jump_queue_capacity.max(1) + 1);

    (
        Transport {
            config,
            cell,
            jumps,
        },
        RtTransport {
            cell: reader,
            jumps: rt_jumps,
            config,
            playhead: config.playhead_start,
            jump_or_pause_occurred: false,
            jump_event: None,
        },
    )
}

//
// ===============================
// MARK: Control thread
// ===============================
//

/// Control-thread end. NOT real-time safe.
pub struct Transport {
    config: TransportConfig,
    cell: CellWriter<TransportConfig>,
    jumps: HandoffSender<PlayheadJumpEvent>,
}

impl Transport {
    #[inline]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn publish(&mut self) {
        self.cell.set(self.config);
    }

    pub fn play(&mut self) {
        self.config.is_playing = true;
        self.publish();
        log::debug!("Transport playing");
    }

    /// Stop playback. The audio thread returns the playhead to
    /// `playhead_start` on the next block.
    pub fn stop(&mut self) {
        self.config.is_playing = false;
        self.publish();
        log::debug!("Transport stopped");
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        if !(bpm.is_finite() && bpm > 0.0) {
            log::warn!("Ignoring invalid tempo {}", bpm);
            return;
        }
        self.config.bpm = bpm;
        self.publish();
    }

    pub fn set_ticks_per_quarter(&mut self, ticks: i64) {
        if ticks <= 0 {
            log::warn!("Ignoring invalid ticks per quarter {}", ticks);
            return;
        }
        self.config.ticks_per_quarter = ticks;
        self.publish();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            log::warn!("Ignoring invalid sample rate {}", sample_rate);
            return;
        }
        self.config.sample_rate = sample_rate;
        self.publish();
    }

    pub fn set_active_sequence(&mut self, sequence: Option<SequenceId>) {
        self.config.active_sequence = sequence;
        self.publish();
    }

    /// Loop `[start, end)`. An empty or inverted range disables looping.
    pub fn set_loop(&mut self, start: f64, end: f64) {
        if end <= start {
            log::warn!("Loop end {} is not after loop start {}; loop disabled", end, start);
            self.clear_loop();
            return;
        }
        self.config.loop_start = start;
        self.config.loop_end = end;
        self.publish();
    }

    pub fn clear_loop(&mut self) {
        self.config.loop_start = 0.0;
        self.config.loop_end = f64::INFINITY;
        self.publish();
    }

    pub fn set_playhead_start(&mut self, position: f64) {
        self.config.playhead_start = position;
        self.publish();
    }

    /// Move the playhead. Notes already sounding at `position` in the
    /// active sequence are started on arrival.
    pub fn jump_to(&mut self, position: f64, model: &SequenceModel) {
        let event = PlayheadJumpEvent::new(position, self.config.active_sequence, model);
        if !self.jumps.send_or_queue(event) {
            log::warn!("Jump queue is full; {} jumps waiting", self.jumps.backlog_len());
        }
    }

    /// Drop jump events the audio thread has finished with.
    pub fn reclaim(&mut self) -> usize {
        self.jumps.flush_backlog();

        let mut reclaimed = 0;
        while let Some(event) = self.jumps.next_returned() {
            drop(event);
            reclaimed += 1;
        }
        reclaimed
    }
}

//
// ===============================
// MARK: Audio thread
// ===============================
//

/// A stretch of playhead movement that does not cross the loop end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayheadSegment {
    /// Inclusive, in ticks.
    pub start: f64,
    /// Exclusive, in ticks.
    pub end: f64,
    /// Ticks covered by earlier segments of the same block.
    pub ticks_before: f64,
    /// The playhead wraps to `loop_start` after this segment.
    pub wrapped: bool,
}

/// Splits one block's advance at every loop end it crosses.
#[derive(Debug, Clone)]
pub struct LoopSegments {
    position: f64,
    remaining: f64,
    consumed: f64,
    loop_start: f64,
    loop_end: f64,
    looping: bool,
}

impl LoopSegments {
    pub fn new(position: f64, advance: f64, config: &TransportConfig) -> Self {
        Self {
            position,
            remaining: advance,
            consumed: 0.0,
            loop_start: config.loop_start,
            loop_end: config.loop_end,
            looping: config.has_loop(),
        }
    }
}

impl Iterator for LoopSegments {
    type Item = PlayheadSegment;

    fn next(&mut self) -> Option<PlayheadSegment> {
        if self.remaining <= 0.0 {
            return None;
        }

        let start = self.position;
        let ticks_before = self.consumed;

        if self.looping && self.position + self.remaining >= self.loop_end {
            // Loop may have been placed behind the playhead
            let amount = (self.loop_end - self.position).max(0.0);
            self.remaining -= amount;
            self.consumed += amount;
            self.position = self.loop_start;

            return Some(PlayheadSegment {
                start,
                end: start + amount,
                ticks_before,
                wrapped: true,
            });
        }

        let amount = self.remaining;
        self.position += amount;
        self.consumed += amount;
        self.remaining = 0.0;

        Some(PlayheadSegment {
            start,
            end: self.position,
            ticks_before,
            wrapped: false,
        })
    }
}

/// Audio-thread end. Real-time safe.
pub struct RtTransport {
    cell: CellReader<TransportConfig>,
    jumps: HandoffReceiver<PlayheadJumpEvent>,
    config: TransportConfig,
    playhead: f64,
    jump_or_pause_occurred: bool,
    jump_event: Option<PlayheadJumpEvent>,
}

impl RtTransport {
    /// Pick up config changes and pending jumps. Call once at the start
    /// of every block.
    pub fn rt_prepare_for_processing_block(&mut self) {
        let config = self.cell.rt_get();

        if !config.is_playing && self.config.is_playing {
            self.playhead = config.playhead_start;
            self.jump_or_pause_occurred = true;
        }
        self.config = config;

        self.jumps.adopt(&mut self.jump_event, 1);

        if let Some(jump) = &self.jump_event {
            self.playhead = jump.new_playhead_position;
            self.jump_or_pause_occurred = true;
        }

        // Nothing plays while stopped, so its start notes are dropped
        if !self.config.is_playing {
            if let Some(jump) = self.jump_event.take() {
                self.jumps.retire(jump);
            }
        }
    }

    /// Ticks the playhead would move over `num_samples`, ignoring loops.
    #[inline]
    pub fn rt_get_playhead_advance_amount(&self, num_samples: usize) -> f64 {
        if self.config.is_playing {
            num_samples as f64 * self.config.ticks_per_sample()
        } else {
            0.0
        }
    }

    /// This block's movement, split at loop ends.
    pub fn rt_loop_segments(&self, num_samples: usize) -> LoopSegments {
        LoopSegments::new(
            self.playhead,
            self.rt_get_playhead_advance_amount(num_samples),
            &self.config,
        )
    }

    /// Where the playhead would be after `num_samples`. No side effects.
    pub fn rt_get_playhead_after_advance(&self, num_samples: usize) -> f64 {
        self.rt_loop_segments(num_samples)
            .last()
            .map(|segment| {
                if segment.wrapped {
                    self.config.loop_start
                } else {
                    segment.end
                }
            })
            .unwrap_or(self.playhead)
    }

    /// Commit the block: move the playhead, clear the jump flag and hand
    /// any jump event back. Call once at the end of every block.
    pub fn rt_advance_playhead(&mut self, num_samples: usize) {
        self.playhead = self.rt_get_playhead_after_advance(num_samples);
        self.jump_or_pause_occurred = false;

        if let Some(jump) = self.jump_event.take() {
            self.jumps.retire(jump);
        }
    }

    /// Playhead at the start of the current block, in ticks.
    #[inline]
    pub fn rt_playhead(&self) -> f64 {
        self.playhead
    }

    #[inline]
    pub fn rt_config(&self) -> &TransportConfig {
        &self.config
    }

    /// True for the block after a stop or a jump. Note generators should
    /// silence their voices.
    #[inline]
    pub fn rt_jump_or_pause_occurred(&self) -> bool {
        self.jump_or_pause_occurred
    }

    #[inline]
    pub fn rt_jump_event(&self) -> Option<&PlayheadJumpEvent> {
        self.jump_event.as_ref()
    }

    #[inline]
    pub fn rt_ticks_per_sample(&self) -> f64 {
        self.config.ticks_per_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::model::{Arrangement, Clip, Note};

    // 96 ticks per quarter at 120 bpm and 48 kHz
    const TICKS_PER_SAMPLE: f64 = 0.004;

    /// Publish and let the audio side pick it up.
    fn block(rt: &mut RtTransport, num_samples: usize) {
        rt.rt_prepare_for_processing_block();
        rt.rt_advance_playhead(num_samples);
    }

    #[test]
    fn test_advance_uses_configured_sample_rate() {
        let config = TransportConfig::default();
        assert_eq!(config.ticks_per_sample(), TICKS_PER_SAMPLE);

        let slow = TransportConfig {
            sample_rate: 96_000.0,
            ..config
        };
        assert_eq!(slow.ticks_per_sample(), TICKS_PER_SAMPLE / 2.0);
    }

    #[test]
    fn test_stopped_transport_does_not_move() {
        let (_transport, mut rt) = transport(TransportConfig::default());
        block(&mut rt, 1000);
        assert_eq!(rt.rt_playhead(), 0.0);
        assert_eq!(rt.rt_get_playhead_advance_amount(1000), 0.0);
    }

    #[test]
    fn test_play_then_stop_resets_to_start() {
        let (mut transport, mut rt) = transport(TransportConfig::default());
        transport.set_playhead_start(8.0);
        transport.play();

        rt.rt_prepare_for_processing_block();
        assert_eq!(rt.rt_get_playhead_after_advance(1000), 4.0);
        rt.rt_advance_playhead(1000);
        assert_eq!(rt.rt_playhead(), 4.0);
        assert!(!rt.rt_jump_or_pause_occurred());

        transport.stop();
        rt.rt_prepare_for_processing_block();
        assert_eq!(rt.rt_playhead(), 8.0);
        assert!(rt.rt_jump_or_pause_occurred());

        rt.rt_advance_playhead(1000);
        assert!(!rt.rt_jump_or_pause_occurred());
        assert_eq!(rt.rt_playhead(), 8.0);
    }

    #[test]
    fn test_loop_wraps_playhead() {
        let (mut transport, mut rt) = transport(TransportConfig::default());
        transport.set_loop(0.0, 4.0);
        transport.play();

        // 750 samples = 3 ticks, then 500 samples = 2 ticks crosses 4
        block(&mut rt, 750);
        assert_eq!(rt.rt_playhead(), 3.0);

        rt.rt_prepare_for_processing_block();
        let segments: Vec<_> = rt.rt_loop_segments(500).collect();
        assert_eq!(
            segments,
            vec![
                PlayheadSegment {
                    start: 3.0,
                    end: 4.0,
                    ticks_before: 0.0,
                    wrapped: true
                },
                PlayheadSegment {
                    start: 0.0,
                    end: 1.0,
                    ticks_before: 1.0,
                    wrapped: false
                },
            ]
        );
        rt.rt_advance_playhead(500);
        assert_eq!(rt.rt_playhead(), 1.0);
    }

    #[test]
    fn test_loop_behind_playhead_wraps_immediately() {
        let config = TransportConfig {
            loop_start: 0.0,
            loop_end: 4.0,
            is_playing: true,
            ..TransportConfig::default()
        };
        let segments: Vec<_> = LoopSegments::new(10.0, 2.0, &config).collect();

        assert_eq!(segments.len(), 2);
        assert!(segments[0].wrapped);
        assert_eq!(segments[0].end, segments[0].start);
        assert_eq!(segments[1].start, 0.0);
        assert_eq!(segments[1].end, 2.0);
    }

    #[test]
    fn test_invalid_sample_rate_is_ignored() {
        let (mut transport, mut rt) = transport(TransportConfig::default());
        for rate in [0.0, -48_000.0, f64::NAN, f64::INFINITY] {
            transport.set_sample_rate(rate);
        }
        assert_eq!(transport.config().sample_rate, 48_000.0);

        transport.play();
        block(&mut rt, 1000);
        assert!((rt.rt_playhead() - 4.0).abs() < 1e-9);

        transport.set_sample_rate(96_000.0);
        block(&mut rt, 1000);
        // Half as many ticks per sample at the doubled rate
        assert!((rt.rt_playhead() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_loop_is_disabled() {
        let (mut transport, _rt) = transport(TransportConfig::default());
        transport.set_loop(8.0, 4.0);
        assert!(!transport.config().has_loop());
    }

    #[test]
    fn test_jump_while_playing() {
        let mut model = SequenceModel::new();
        model.patterns.insert(
            1,
            crate::sequencer::model::Pattern::new()
                .with_note(5, Note::new(60, 0.5, 0, 20))
                .with_note(5, Note::new(62, 0.5, 10, 5)),
        );

        let (mut transport, mut rt) = transport(TransportConfig::default());
        transport.set_active_sequence(Some(1));
        transport.play();
        block(&mut rt, 64);

        transport.jump_to(10.0, &model);
        rt.rt_prepare_for_processing_block();

        assert_eq!(rt.rt_playhead(), 10.0);
        assert!(rt.rt_jump_or_pause_occurred());
        let jump = rt.rt_jump_event().unwrap();
        // The note starting exactly at 10 is left to the sequencer
        assert_eq!(
            jump.events_for_channel(5),
            &[LiveEvent::new(0.0, Event::NoteOn {
                pitch: 60,
                channel: 0,
                velocity: 0.5,
                detune: 0.0,
                id: -1
            })]
        );

        rt.rt_advance_playhead(64);
        assert!(rt.rt_jump_event().is_none());
        assert_eq!(transport.reclaim(), 1);
    }

    #[test]
    fn test_jump_while_stopped_moves_playhead_only() {
        let (mut transport, mut rt) = transport(TransportConfig::default());
        transport.jump_to(42.0, &SequenceModel::new());

        rt.rt_prepare_for_processing_block();
        assert_eq!(rt.rt_playhead(), 42.0);
        assert!(rt.rt_jump_event().is_none());
        assert_eq!(transport.reclaim(), 1);
    }

    #[test]
    fn test_jump_into_arrangement_clip() {
        let mut model = SequenceModel::new();
        model.patterns.insert(
            1,
            crate::sequencer::model::Pattern::new().with_note(3, Note::new(64, 1.0, 20, 20)),
        );
        model.arrangements.insert(
            2,
            Arrangement::new()
                .with_clip(1, Clip::new(1, 100).with_time_view(10, 50))
                .with_clip(2, Clip::new(1, 500)),
        );

        // 100 + (25 - 10): inside the note in the first clip
        let jump = PlayheadJumpEvent::new(115.0, Some(2), &model);
        assert_eq!(jump.events_for_channel(3).len(), 1);

        // Past the end of the first clip's view, before the second clip
        let jump = PlayheadJumpEvent::new(145.0, Some(2), &model);
        assert!(jump.events_for_channel(3).is_empty());

        let jump = PlayheadJumpEvent::new(530.0, Some(2), &model);
        assert_eq!(jump.events_for_channel(3).len(), 1);
    }
}
