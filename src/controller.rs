// src/controller.rs
//
// Control-thread side of the engine.
//
// The controller owns every editable structure (graph topology, sequence
// model, transport settings) and turns edits into immutable snapshots
// that travel to the audio thread: compiled execution plans, compiled
// sequence maps, transport configs and playhead jumps. It also drops
// whatever the audio thread hands back once it is done with it.

use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineReadback, SharedReadback};
use crate::error::{EngineError, EngineResult};
use crate::graph::{
    compile, scheduler, ConnectionId, NodeId, PlanSubmitter, PortId, Processor, Topology,
};
use crate::sequencer::{
    compile_sequence, sequence_store, transport_with_capacity, ChannelId,
    SequenceEventListCollection, SequenceId, SequenceModel, SequenceStore, Transport,
    TransportConfig,
};

/// Create a linked controller and engine.
///
/// The `Engine` is moved to the audio thread; the controller stays on the
/// control thread.
pub fn create_engine(config: EngineConfig) -> (EngineController, Engine) {
    let config = config.validate();

    let (plans, graph) = scheduler::channel(config.plan_queue_capacity);
    let (sequences, rt_sequences) = sequence_store(config.sequence_queue_capacity);

    let transport_config = TransportConfig {
        bpm: config.default_bpm,
        ticks_per_quarter: config.ticks_per_quarter,
        sample_rate: config.sample_rate,
        ..TransportConfig::default()
    };
    let (transport, rt_transport) =
        transport_with_capacity(transport_config, config.jump_queue_capacity);

    let readback = Arc::new(SharedReadback::new(transport_config.playhead_start));

    let engine = Engine::new(
        graph,
        rt_sequences,
        rt_transport,
        Arc::clone(&readback),
        config.max_block_size,
        config.sample_rate,
    );

    log::info!(
        "Engine created: {} Hz, {} frames max, {} channels",
        config.sample_rate,
        config.max_block_size,
        config.num_channels
    );

    let controller = EngineController {
        topology: Topology::new(),
        plans,
        sequences,
        transport,
        model: SequenceModel::new(),
        readback,
        reported: EngineReadback::default(),
        last_reclaim: Instant::now(),
        config,
    };

    (controller, engine)
}

/// What one call to [`EngineController::reclaim`] dropped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reclaimed {
    pub plans: usize,
    pub sequence_maps: usize,
    pub jump_events: usize,
}

impl Reclaimed {
    pub fn total(&self) -> usize {
        self.plans + self.sequence_maps + self.jump_events
    }
}

/// Editing surface of the engine.
///
/// This struct is NOT real-time safe: it allocates, compiles and logs.
pub struct EngineController {
    config: EngineConfig,

    /// Editable processing graph
    topology: Topology,

    /// Sends compiled plans, receives retired ones
    plans: PlanSubmitter,

    /// Compiled note lists shared with the audio thread
    sequences: SequenceStore,

    transport: Transport,

    /// Patterns and arrangements the sequences are compiled from
    model: SequenceModel,

    /// Counters published by the engine
    readback: Arc<SharedReadback>,

    /// Counter values already reported in the log
    reported: EngineReadback,

    last_reclaim: Instant,
}

impl EngineController {
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ───────────────────────────────────────────────────────────────
    // Graph
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Prepare `processor` for the engine's sample rate and add it.
    ///
    /// The node is not heard until the next [`compile_and_submit`](Self::compile_and_submit).
    pub fn add_node(&mut self, mut processor: Box<dyn Processor>) -> NodeId {
        processor.prepare(self.config.sample_rate, self.config.max_block_size);
        self.topology.add_node(processor)
    }

    pub fn remove_node(&mut self, id: NodeId) -> EngineResult<()> {
        Ok(self.topology.remove_node(id)?)
    }

    pub fn connect(&mut self, source: PortId, destination: PortId) -> EngineResult<ConnectionId> {
        Ok(self.topology.connect(source, destination)?)
    }

    pub fn disconnect(&mut self, source: PortId, destination: PortId) -> EngineResult<()> {
        Ok(self.topology.disconnect(source, destination)?)
    }

    pub fn set_master_output(&mut self, id: NodeId) -> EngineResult<()> {
        Ok(self.topology.set_master_output(id)?)
    }

    /// Takes effect on the next block; no recompilation needed.
    pub fn set_parameter(&mut self, port: PortId, value: f32) -> EngineResult<()> {
        Ok(self.topology.set_parameter(port, value)?)
    }

    /// Compile the current topology and queue the plan for the audio thread.
    pub fn compile_and_submit(&mut self) -> EngineResult<()> {
        // Make room if earlier plans are waiting to be dropped
        self.plans.reclaim();

        let plan = compile(&self.topology, &self.config)?;
        log::debug!(
            "Submitting plan: {} nodes, {} actions",
            plan.node_count(),
            plan.action_count()
        );

        self.plans
            .submit_plan(plan)
            .map_err(|_| EngineError::PlanQueueFull)
    }

    // ───────────────────────────────────────────────────────────────
    // Sequences
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    /// Edits here are not heard until the affected sequence is rebuilt.
    #[inline]
    pub fn model_mut(&mut self) -> &mut SequenceModel {
        &mut self.model
    }

    #[inline]
    pub fn sequences(&self) -> &SequenceStore {
        &self.sequences
    }

    /// Recompile every channel of a pattern or arrangement and publish it.
    pub fn rebuild_sequence(&mut self, id: SequenceId) -> EngineResult<()> {
        let compiled = compile_sequence(&self.model, id, None)?;
        self.sequences
            .add_or_update_sequence(id, SequenceEventListCollection::from_compiled(compiled));
        Ok(())
    }

    /// Recompile one channel of a sequence and publish it.
    pub fn rebuild_channel(&mut self, id: SequenceId, channel: ChannelId) -> EngineResult<()> {
        let mut compiled = compile_sequence(&self.model, id, Some(&[channel]))?;
        let list = compiled.remove(&channel).unwrap_or_default();
        self.sequences
            .add_or_update_channel_in_sequence(id, channel, list);
        Ok(())
    }

    /// Drop a sequence from the model and from the audio thread.
    pub fn remove_sequence(&mut self, id: SequenceId) {
        self.model.patterns.remove(&id);
        self.model.arrangements.remove(&id);
        self.sequences.remove_sequence(id);
    }

    /// Forget a channel that no longer exists, in every sequence.
    pub fn remove_channel(&mut self, channel: ChannelId) {
        for pattern in self.model.patterns.values_mut() {
            pattern.notes.remove(&channel);
        }
        self.sequences.clean_up_channel(channel);
    }

    // ───────────────────────────────────────────────────────────────
    // Transport
    // ───────────────────────────────────────────────────────────────

    #[inline]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Move the playhead, starting notes that span `position` in the
    /// active sequence.
    pub fn jump_to(&mut self, position: f64) {
        self.transport.jump_to(position, &self.model);
    }

    // ───────────────────────────────────────────────────────────────
    // Reclamation and readback
    // ───────────────────────────────────────────────────────────────

    /// Drop everything the audio thread has retired and report any new
    /// failures it counted since the last call.
    pub fn reclaim(&mut self) -> Reclaimed {
        let reclaimed = Reclaimed {
            plans: self.plans.reclaim(),
            sequence_maps: self.sequences.reclaim(),
            jump_events: self.transport.reclaim(),
        };
        self.last_reclaim = Instant::now();
        self.report_counters();
        reclaimed
    }

    /// Call [`reclaim`](Self::reclaim) if `reclaim_interval` has passed
    /// since the last reclamation.
    pub fn maybe_reclaim(&mut self, now: Instant) -> Option<Reclaimed> {
        if now.saturating_duration_since(self.last_reclaim) < self.config.reclaim_interval {
            return None;
        }
        let reclaimed = self.reclaim();
        self.last_reclaim = now;
        Some(reclaimed)
    }

    #[inline]
    pub fn readback(&self) -> EngineReadback {
        self.readback.snapshot()
    }

    fn report_counters(&mut self) {
        let now = self.readback.snapshot();
        let before = self.reported;

        if now.dropped_events > before.dropped_events {
            log::warn!(
                "Audio thread dropped {} events (event arena exhausted)",
                now.dropped_events - before.dropped_events
            );
        }
        if now.lock_contentions > before.lock_contentions {
            log::warn!(
                "Audio thread skipped {} node runs (processor locked)",
                now.lock_contentions - before.lock_contentions
            );
        }
        if now.deferred_adoptions > before.deferred_adoptions {
            log::warn!(
                "Plan adoption deferred in {} blocks (retire queue full)",
                now.deferred_adoptions - before.deferred_adoptions
            );
        }
        if now.oversized_blocks > before.oversized_blocks {
            log::warn!(
                "{} blocks exceeded the maximum block size of {}",
                now.oversized_blocks - before.oversized_blocks,
                self.config.max_block_size
            );
        }

        self.reported = now;
    }
}
