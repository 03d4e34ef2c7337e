// src/main.rs
//
// Headless demo: plays a looping arpeggio through
// sequence -> synth -> gain -> master output on a separate "audio" thread
// while the main thread edits parameters and reclaims retired objects.

use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use tessera::graph::{PortConfig, ProcessContext, Processor};
use tessera::nodes::{GainProcessor, MasterOutput, SequenceNoteProvider};
use tessera::sequencer::{Note, Pattern};
use tessera::{create_engine, EngineConfig, EngineResult, Event, LiveEvent};

const BLOCK_FRAMES: usize = 256;
const BLOCKS: usize = 400;
const CHANNEL: u64 = 1;
const PATTERN: u64 = 1;

/// ===============================
/// Demo synth
/// ===============================

/// One sine voice that follows the most recent note.
struct SineVoice {
    sample_rate: f32,
    phase: f32,
    frequency: f32,
    amplitude: f32,
    /// Block-local copy of incoming events, preallocated
    pending: Vec<LiveEvent>,
}

impl SineVoice {
    const MAX_EVENTS: usize = 64;

    fn new() -> Self {
        Self {
            sample_rate: 48_000.0,
            phase: 0.0,
            frequency: 0.0,
            amplitude: 0.0,
            pending: Vec::with_capacity(Self::MAX_EVENTS),
        }
    }

    fn apply(&mut self, event: &Event) {
        match *event {
            Event::NoteOn {
                pitch, velocity, ..
            } => {
                self.frequency = 440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0);
                self.amplitude = velocity * 0.25;
            }
            Event::NoteOff { .. } | Event::AllVoicesOff => {
                self.amplitude = 0.0;
            }
        }
    }

    fn render(&mut self, out: &mut [f32]) {
        let step = self.frequency / self.sample_rate;
        for sample in out {
            *sample = (self.phase * TAU).sin() * self.amplitude;
            self.phase = (self.phase + step).fract();
        }
    }
}

impl Processor for SineVoice {
    fn name(&self) -> &str {
        "SineVoice"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![PortConfig::event_input(), PortConfig::audio_output(1)]
    }

    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = sample_rate as f32;
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, num_samples: usize) {
        self.pending.clear();
        self.pending
            .extend(ctx.input_events(0).take(Self::MAX_EVENTS));
        self.pending.sort_unstable_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.event.kind().cmp(&b.event.kind()))
        });

        let Some(output) = ctx.audio_output(0) else {
            return;
        };
        let output = output.channel_mut(0);
        let mut pending = std::mem::take(&mut self.pending);

        let mut cursor = 0;
        for event in &pending {
            let at = (event.time.max(0.0) as usize).min(num_samples);
            self.render(&mut output[cursor..at.max(cursor)]);
            cursor = at.max(cursor);
            self.apply(&event.event);
        }
        self.render(&mut output[cursor..num_samples]);

        pending.clear();
        self.pending = pending;
    }
}

/// ===============================
/// Main
/// ===============================

fn main() -> EngineResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = EngineConfig::default()
        .with_max_block_size(BLOCK_FRAMES)
        .with_reclaim_interval(Duration::from_millis(50));
    let (mut controller, mut engine) = create_engine(config);

    // --------------------------------
    // Graph
    // --------------------------------

    let notes = controller.add_node(Box::new(SequenceNoteProvider::new(CHANNEL)));
    let synth = controller.add_node(Box::new(SineVoice::new()));
    let gain = controller.add_node(Box::new(GainProcessor::new(1)));
    let master = controller.add_node(Box::new(MasterOutput::new(1)));

    let topology = controller.topology();
    let notes_out = topology.node(notes).and_then(|n| n.event_output(0));
    let synth_in = topology.node(synth).and_then(|n| n.event_input(0));
    let synth_out = topology.node(synth).and_then(|n| n.audio_output(0));
    let gain_in = topology.node(gain).and_then(|n| n.audio_input(0));
    let gain_out = topology.node(gain).and_then(|n| n.audio_output(0));
    let gain_param = topology.node(gain).and_then(|n| n.control_input(0));
    let master_in = topology.node(master).and_then(|n| n.audio_input(0));

    let (
        Some(notes_out),
        Some(synth_in),
        Some(synth_out),
        Some(gain_in),
        Some(gain_out),
        Some(gain_param),
        Some(master_in),
    ) = (notes_out, synth_in, synth_out, gain_in, gain_out, gain_param, master_in)
    else {
        log::error!("Built-in node is missing a port");
        return Ok(());
    };

    controller.connect(notes_out, synth_in)?;
    controller.connect(synth_out, gain_in)?;
    controller.connect(gain_out, master_in)?;
    controller.set_master_output(master)?;
    controller.compile_and_submit()?;

    // --------------------------------
    // Sequence: one bar of quarter notes, looped
    // --------------------------------

    let ticks_per_quarter = controller.config().ticks_per_quarter;
    let mut pattern = Pattern::new();
    for (i, pitch) in [60, 64, 67, 72].into_iter().enumerate() {
        let offset = i as i64 * ticks_per_quarter;
        pattern.add_note(CHANNEL, Note::new(pitch, 1.0, offset, ticks_per_quarter / 2));
    }
    controller.model_mut().patterns.insert(PATTERN, pattern);
    controller.rebuild_sequence(PATTERN)?;

    let transport = controller.transport_mut();
    transport.set_active_sequence(Some(PATTERN));
    transport.set_loop(0.0, (4 * ticks_per_quarter) as f64);
    transport.play();

    // --------------------------------
    // Audio thread
    // --------------------------------

    let audio = thread::spawn(move || {
        let mut peak = 0.0f32;
        for _ in 0..BLOCKS {
            engine.process(BLOCK_FRAMES);
            if let Some(output) = engine.master_output() {
                peak = peak.max(output.peak(BLOCK_FRAMES));
            }
            thread::sleep(Duration::from_millis(1));
        }
        peak
    });

    // --------------------------------
    // Control loop
    // --------------------------------

    let mut halved = false;
    while !audio.is_finished() {
        let readback = controller.readback();
        if !halved && readback.blocks_processed >= (BLOCKS / 2) as u64 {
            controller.set_parameter(gain_param, 0.5)?;
            log::info!("Gain lowered at playhead {:.1}", readback.playhead);
            halved = true;
        }

        controller.maybe_reclaim(Instant::now());
        thread::sleep(Duration::from_millis(5));
    }

    let peak = match audio.join() {
        Ok(peak) => peak,
        Err(_) => {
            log::error!("Audio thread panicked");
            return Ok(());
        }
    };

    let reclaimed = controller.reclaim();
    let readback = controller.readback();
    log::info!(
        "Rendered {} blocks, peak {:.3}, playhead {:.1} ticks, {} objects reclaimed at exit",
        readback.blocks_processed,
        peak,
        readback.playhead,
        reclaimed.total()
    );

    Ok(())
}
