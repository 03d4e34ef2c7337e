// src/engine.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::audio_buffer::SampleBuffer;
use crate::graph::{ExecutionPlan, GraphProcessor, RenderContext};
use crate::sequencer::{RtSequenceStore, RtTransport};

/// Real-time audio engine.
///
/// This struct runs exclusively on the audio thread.
/// It must be deterministic, allocation-free, and lock-free.
/// Everything it needs arrives through the queues created by
/// [`create_engine`](crate::controller::create_engine).
pub struct Engine {
    /// Active execution plan and the queues that replace it
    graph: GraphProcessor,

    /// Compiled note lists, newest map adopted each block
    sequences: RtSequenceStore,

    /// Playhead and loop state
    transport: RtTransport,

    /// Shared counters (written here, read by the controller)
    readback: Arc<SharedReadback>,

    max_block_size: usize,
    sample_rate: f64,
    blocks_processed: u64,
    oversized_blocks: u64,
}

impl Engine {
    pub(crate) fn new(
        graph: GraphProcessor,
        sequences: RtSequenceStore,
        transport: RtTransport,
        readback: Arc<SharedReadback>,
        max_block_size: usize,
        sample_rate: f64,
    ) -> Self {
        Self {
            graph,
            sequences,
            transport,
            readback,
            max_block_size,
            sample_rate,
            blocks_processed: 0,
            oversized_blocks: 0,
        }
    }

    /// Render one block.
    ///
    /// Called once per audio callback. Requests larger than the
    /// configured maximum block size are clamped to it.
    pub fn process(&mut self, num_samples: usize) {
        let num_samples = if num_samples > self.max_block_size {
            self.oversized_blocks += 1;
            self.max_block_size
        } else {
            num_samples
        };

        self.transport.rt_prepare_for_processing_block();
        let sequences = self.sequences.rt_get_event_lists();

        let render = RenderContext {
            sample_rate: self.sample_rate,
            transport: &self.transport,
            sequences,
        };
        self.graph.process(num_samples, &render);

        self.transport.rt_advance_playhead(num_samples);
        self.blocks_processed += 1;
        self.publish_readback();
    }

    /// The master output node's input buffer after the last block.
    ///
    /// `None` until a plan with a master output has been adopted.
    #[inline]
    pub fn master_output(&self) -> Option<&SampleBuffer> {
        self.graph.master_output()
    }

    /// The plan run by the last block.
    #[inline]
    pub fn active_plan(&self) -> Option<&ExecutionPlan> {
        self.graph.active_plan()
    }

    #[inline]
    pub fn playhead(&self) -> f64 {
        self.transport.rt_playhead()
    }

    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    fn publish_readback(&self) {
        let stats = self.graph.stats();
        let r = &self.readback;

        r.blocks_processed.store(self.blocks_processed, Ordering::Relaxed);
        r.oversized_blocks.store(self.oversized_blocks, Ordering::Relaxed);
        r.plans_adopted.store(stats.plans_adopted, Ordering::Relaxed);
        r.deferred_adoptions.store(stats.deferred_adoptions, Ordering::Relaxed);
        r.lock_contentions.store(stats.lock_contentions, Ordering::Relaxed);
        r.dropped_events.store(stats.dropped_events, Ordering::Relaxed);
        r.sequence_maps_adopted
            .store(self.sequences.rt_maps_adopted(), Ordering::Relaxed);
        r.playhead_bits
            .store(self.transport.rt_playhead().to_bits(), Ordering::Relaxed);
        r.playing
            .store(self.transport.rt_config().is_playing, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Readback
// ═══════════════════════════════════════════════════════════════════

/// Lock-free shared state for engine -> controller readback.
///
/// The audio thread owns the running totals and stores them here after
/// every block; nothing reads them back on the audio side.
#[derive(Debug)]
pub(crate) struct SharedReadback {
    blocks_processed: AtomicU64,
    oversized_blocks: AtomicU64,
    plans_adopted: AtomicU64,
    deferred_adoptions: AtomicU64,
    lock_contentions: AtomicU64,
    dropped_events: AtomicU64,
    sequence_maps_adopted: AtomicU64,
    /// Playhead in ticks, stored as f64 bits (no AtomicF64 in std)
    playhead_bits: AtomicU64,
    playing: AtomicBool,
}

impl SharedReadback {
    pub(crate) fn new(playhead: f64) -> Self {
        Self {
            blocks_processed: AtomicU64::new(0),
            oversized_blocks: AtomicU64::new(0),
            plans_adopted: AtomicU64::new(0),
            deferred_adoptions: AtomicU64::new(0),
            lock_contentions: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            sequence_maps_adopted: AtomicU64::new(0),
            playhead_bits: AtomicU64::new(playhead.to_bits()),
            playing: AtomicBool::new(false),
        }
    }

    pub(crate) fn snapshot(&self) -> EngineReadback {
        EngineReadback {
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            oversized_blocks: self.oversized_blocks.load(Ordering::Relaxed),
            plans_adopted: self.plans_adopted.load(Ordering::Relaxed),
            deferred_adoptions: self.deferred_adoptions.load(Ordering::Relaxed),
            lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            sequence_maps_adopted: self.sequence_maps_adopted.load(Ordering::Relaxed),
            playhead: f64::from_bits(self.playhead_bits.load(Ordering::Relaxed)),
            playing: self.playing.load(Ordering::Relaxed),
        }
    }
}

/// A copy of the engine's counters as of its last block.
///
/// Each field is read independently, so a snapshot taken while a block
/// is being published may mix values from two consecutive blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EngineReadback {
    pub blocks_processed: u64,
    /// Blocks requested with more samples than `max_block_size`.
    pub oversized_blocks: u64,
    pub plans_adopted: u64,
    /// Blocks in which a submitted plan had to wait for retire space.
    pub deferred_adoptions: u64,
    /// Node runs skipped because the processor was locked elsewhere.
    pub lock_contentions: u64,
    /// Events lost to arena exhaustion.
    pub dropped_events: u64,
    pub sequence_maps_adopted: u64,
    /// Playhead in ticks.
    pub playhead: f64,
    pub playing: bool,
}
