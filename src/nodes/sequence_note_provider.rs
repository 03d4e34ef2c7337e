// Sequence note provider node

use crate::event::{Event, LiveEvent};
use crate::graph::{PortConfig, ProcessContext, Processor};
use crate::sequencer::ChannelId;

// ═══════════════════════════════════════════════════════════════════
// Sequence Note Provider
// ═══════════════════════════════════════════════════════════════════

/// Plays one channel of the active sequence as live events.
///
/// Reads the compiled event list for its channel every block and emits
/// the events that fall under the playhead, converted to sample offsets.
/// Emits `AllVoicesOff` whenever playback stops, jumps or wraps.
pub struct SequenceNoteProvider {
    channel: ChannelId,
}

impl SequenceNoteProvider {
    pub fn new(channel: ChannelId) -> Self {
        Self { channel }
    }

    #[inline]
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl Processor for SequenceNoteProvider {
    fn name(&self) -> &str {
        "SequenceNoteProvider"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![PortConfig::event_output()]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, num_samples: usize) {
        let render = ctx.render();
        let transport = render.transport;

        if transport.rt_jump_or_pause_occurred() {
            ctx.push_event(0, LiveEvent::new(0.0, Event::AllVoicesOff));
        }

        if let Some(jump) = transport.rt_jump_event() {
            for &event in jump.events_for_channel(self.channel) {
                ctx.push_event(0, event);
            }
        }

        let config = transport.rt_config();
        if !config.is_playing {
            return;
        }

        let Some(sequence) = config.active_sequence else {
            return;
        };

        let Some(list) = render
            .sequences
            .get(&sequence)
            .and_then(|collection| collection.channel(self.channel))
        else {
            return;
        };

        let ticks_per_sample = transport.rt_ticks_per_sample();
        if ticks_per_sample <= 0.0 {
            return;
        }

        let events = &list.events;
        for segment in transport.rt_loop_segments(num_samples) {
            let first = events.partition_point(|e| e.time.as_ticks_f64() < segment.start);

            for event in &events[first..] {
                let ticks = event.time.as_ticks_f64();
                if ticks >= segment.end {
                    break;
                }
                let time = (segment.ticks_before + ticks - segment.start) / ticks_per_sample;
                ctx.push_event(0, LiveEvent::new(time, event.event));
            }

            if segment.wrapped {
                let time = (segment.ticks_before + segment.end - segment.start) / ticks_per_sample;
                ctx.push_event(0, LiveEvent::new(time, Event::AllVoicesOff));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::event::EventKind;
    use crate::graph::{compile, ExecutionPlan, NodeId, RenderContext, Topology};
    use crate::sequencer::{
        compile_pattern, transport, Note, Pattern, RtTransport, SequenceEventListCollection,
        SequenceMap, SequenceModel, Transport, TransportConfig,
    };

    const CHANNEL: ChannelId = 3;
    const SEQUENCE: u64 = 1;

    struct Rig {
        plan: ExecutionPlan,
        node: NodeId,
        transport: Transport,
        rt: RtTransport,
        sequences: SequenceMap,
        model: SequenceModel,
    }

    impl Rig {
        fn new(notes: &[Note]) -> Self {
            let mut model = SequenceModel::new();
            let mut pattern = Pattern::new();
            for &note in notes {
                pattern.add_note(CHANNEL, note);
            }
            model.patterns.insert(SEQUENCE, pattern);

            let mut sequences = SequenceMap::new();
            sequences.insert(
                SEQUENCE,
                SequenceEventListCollection::from_compiled(
                    compile_pattern(&model, SEQUENCE, None).unwrap(),
                ),
            );

            let mut topology = Topology::new();
            let node = topology.add_node(Box::new(SequenceNoteProvider::new(CHANNEL)));
            let config = EngineConfig::default().with_max_block_size(8192).with_arena_size(16 * 1024);
            let plan = compile(&topology, &config).unwrap();

            let (mut transport, rt) = transport(TransportConfig::default());
            transport.set_active_sequence(Some(SEQUENCE));

            Self {
                plan,
                node,
                transport,
                rt,
                sequences,
                model,
            }
        }

        /// Run one block; returns (kind, sample offset) of every emitted event.
        fn block(&mut self, num_samples: usize) -> Vec<(EventKind, f64)> {
            self.rt.rt_prepare_for_processing_block();
            let render = RenderContext {
                sample_rate: 48_000.0,
                transport: &self.rt,
                sequences: &self.sequences,
            };
            self.plan.process(num_samples, &render);
            self.rt.rt_advance_playhead(num_samples);

            self.plan
                .output_events(self.node, 0)
                .map(|e| (e.event.kind(), e.time))
                .collect()
        }
    }

    fn assert_events(actual: &[(EventKind, f64)], expected: &[(EventKind, f64)]) {
        assert_eq!(actual.len(), expected.len(), "{:?}", actual);
        for ((kind, time), (expected_kind, expected_time)) in actual.iter().zip(expected) {
            assert_eq!(kind, expected_kind);
            assert!((time - expected_time).abs() < 1e-6, "{} != {}", time, expected_time);
        }
    }

    #[test]
    fn test_stopped_transport_emits_nothing() {
        let mut rig = Rig::new(&[Note::new(60, 1.0, 0, 10)]);
        assert!(rig.block(4000).is_empty());
    }

    #[test]
    fn test_events_land_on_sample_offsets() {
        // 0.004 ticks per sample: 4000 samples = 16 ticks
        let mut rig = Rig::new(&[Note::new(60, 1.0, 10, 10)]);
        rig.transport.play();

        assert_events(&rig.block(4000), &[(EventKind::NoteOn, 2500.0)]);
        assert_events(&rig.block(4000), &[(EventKind::NoteOff, 1000.0)]);
        assert!(rig.block(4000).is_empty());
    }

    #[test]
    fn test_stop_sends_all_voices_off() {
        let mut rig = Rig::new(&[Note::new(60, 1.0, 0, 100)]);
        rig.transport.play();
        assert_events(&rig.block(1000), &[(EventKind::NoteOn, 0.0)]);

        rig.transport.stop();
        assert_events(&rig.block(1000), &[(EventKind::AllVoicesOff, 0.0)]);
        assert!(rig.block(1000).is_empty());
    }

    #[test]
    fn test_loop_wrap_splits_block() {
        let mut rig = Rig::new(&[Note::new(60, 1.0, 0, 2), Note::new(62, 1.0, 7, 1)]);
        rig.transport.set_loop(0.0, 8.0);
        rig.transport.play();

        // Ticks 0..6
        rig.block(1500);

        // Ticks 6..8 then wrap to 0..4
        assert_events(
            &rig.block(1500),
            &[
                (EventKind::NoteOn, 250.0),
                (EventKind::AllVoicesOff, 500.0),
                (EventKind::NoteOn, 500.0),
                (EventKind::NoteOff, 1000.0),
            ],
        );
    }

    #[test]
    fn test_jump_starts_sounding_notes() {
        let mut rig = Rig::new(&[Note::new(60, 1.0, 0, 100)]);
        rig.transport.play();
        rig.block(1000);

        rig.transport.jump_to(50.0, &rig.model);
        assert_events(
            &rig.block(1000),
            &[(EventKind::AllVoicesOff, 0.0), (EventKind::NoteOn, 0.0)],
        );
        assert!((rig.rt.rt_playhead() - 54.0).abs() < 1e-9);
    }
}
