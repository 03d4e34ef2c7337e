// src/graph/plan.rs

use std::sync::Arc;

use super::action::{Action, EdgeRef};
use super::context::{NodeBuffers, ProcessContext, RenderContext};
use super::processor::NodeRuntime;
use super::NodeId;
use crate::audio_buffer::SampleBuffer;
use crate::event::LiveEvent;
use crate::event_buffer::EventArena;

//
// ===============================
// MARK: Execution plan (compiler -> scheduler)
// ===============================
//

/// A compiled, ready-to-run graph.
///
/// Produced by [`compile`](super::compile) on the control thread, run by
/// the [`GraphProcessor`](super::GraphProcessor) on the audio thread.
///
/// Invariants:
/// - Groups run strictly in order. Actions within a group are independent
///   except in copy groups, which run serially.
/// - `contexts[i]` and `nodes[i]` describe the same node.
/// - Nothing here is reallocated while the plan is running.
pub struct ExecutionPlan {
    pub(crate) groups: Vec<Vec<Action>>,
    pub(crate) contexts: Vec<NodeBuffers>,

    /// Keeps every referenced node alive until the plan is reclaimed.
    pub(crate) nodes: Vec<Arc<NodeRuntime>>,

    /// Backing storage for all event buffers in `contexts`.
    pub(crate) arena: EventArena,

    /// Context whose first audio input is the master output.
    pub(crate) master_output: Option<usize>,

    pub(crate) sample_rate: f64,
    pub(crate) max_block_size: usize,
}

/// Counters from running one block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    /// `ProcessNode` actions skipped because the processor was locked.
    pub lock_contentions: usize,
    /// Events lost because the arena could not grow a buffer.
    pub dropped_events: usize,
}

impl ExecutionPlan {
    #[inline]
    pub fn groups(&self) -> &[Vec<Action>] {
        &self.groups
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn action_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Plan-local index of a topology node.
    pub fn context_index(&self, node: NodeId) -> Option<usize> {
        self.contexts.iter().position(|c| c.node == node)
    }

    pub fn context(&self, node: NodeId) -> Option<&NodeBuffers> {
        self.context_index(node).map(|i| &self.contexts[i])
    }

    /// The master output node's input, as rendered by the last block.
    pub fn master_output(&self) -> Option<&SampleBuffer> {
        self.master_output
            .and_then(|i| self.contexts.get(i))
            .and_then(|c| c.audio_inputs.first())
    }

    /// Events currently in an output port of `node`.
    pub fn output_events(&self, node: NodeId, port: usize) -> impl Iterator<Item = LiveEvent> + '_ {
        self.context(node)
            .and_then(|c| c.event_outputs.get(port))
            .into_iter()
            .flat_map(|buffer| buffer.iter(&self.arena))
    }

    /// Events currently in an input port of `node`.
    pub fn input_events(&self, node: NodeId, port: usize) -> impl Iterator<Item = LiveEvent> + '_ {
        self.context(node)
            .and_then(|c| c.event_inputs.get(port))
            .into_iter()
            .flat_map(|buffer| buffer.iter(&self.arena))
    }

    /// Run every group once.
    ///
    /// Audio thread only. Never allocates, never blocks.
    pub fn process(&mut self, num_samples: usize, render: &RenderContext<'_>) -> BlockStats {
        let num_samples = num_samples.min(self.max_block_size);
        let dt = (1.0 / self.sample_rate) as f32;
        let mut stats = BlockStats::default();

        let ExecutionPlan {
            groups,
            contexts,
            nodes,
            arena,
            ..
        } = self;

        for group in groups.iter() {
            for action in group {
                execute(action, contexts, nodes, arena, render, num_samples, dt, &mut stats);
            }
        }

        stats.dropped_events = contexts.iter_mut().map(NodeBuffers::take_dropped_events).sum();
        stats
    }
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("nodes", &self.contexts.len())
            .field("groups", &self.groups.len())
            .field("actions", &self.action_count())
            .field("master_output", &self.master_output)
            .finish()
    }
}

//
// ===============================
// MARK: Action execution
// ===============================
//

#[allow(clippy::too_many_arguments)]
#[inline]
fn execute(
    action: &Action,
    contexts: &mut [NodeBuffers],
    nodes: &[Arc<NodeRuntime>],
    arena: &mut EventArena,
    render: &RenderContext<'_>,
    num_samples: usize,
    dt: f32,
    stats: &mut BlockStats,
) {
    match *action {
        Action::ClearBuffers { context } => contexts[context].clear(),

        Action::ZeroInputBuffers { context } => contexts[context].zero_inputs(),

        Action::WriteParametersToControlInputs { context } => {
            let buffers = &mut contexts[context];
            let parameters = nodes[context].parameters();

            for (index, (smoother, buffer)) in buffers
                .smoothers
                .iter_mut()
                .zip(&mut buffers.control_inputs)
                .enumerate()
            {
                smoother.set_target(parameters.get(index));
                for sample in &mut buffer.channel_mut(0)[..num_samples] {
                    smoother.process(dt);
                    *sample = smoother.current();
                }
            }
        }

        Action::ProcessNode { context } => {
            let node = &nodes[context];
            // Only the audio thread locks a processor once it is in a
            // plan, so this only fails if the control thread is
            // inspecting it. Skip rather than wait.
            let Ok(mut processor) = node.processor().try_lock() else {
                stats.lock_contentions += 1;
                return;
            };

            let mut ctx = ProcessContext::new(
                &mut contexts[context],
                arena,
                node.parameters(),
                render,
                num_samples,
            );
            processor.process(&mut ctx, num_samples);
        }

        Action::CopyAudioBuffer { edge } => {
            let (source, destination) = pair_mut(contexts, edge.source_context, edge.destination_context);
            if let (Some(src), Some(dst)) = (
                source.audio_outputs.get(edge.source_port),
                destination.audio_inputs.get_mut(edge.destination_port),
            ) {
                dst.add_from(src, num_samples);
            }
        }

        Action::CopyControlBuffer { edge, min, max } => {
            let (source, destination) = pair_mut(contexts, edge.source_context, edge.destination_context);
            if let (Some(src), Some(dst)) = (
                source.control_outputs.get(edge.source_port),
                destination.control_inputs.get_mut(edge.destination_port),
            ) {
                let src = &src.channel(0)[..num_samples];
                for (d, &s) in dst.channel_mut(0)[..num_samples].iter_mut().zip(src) {
                    if !s.is_nan() {
                        *d = s * (max - min) + min;
                    }
                }
            }
        }

        Action::CopyEvents { edge } => copy_events(contexts, arena, edge),
    }
}

fn copy_events(contexts: &mut [NodeBuffers], arena: &mut EventArena, edge: EdgeRef) {
    let (source, destination) = pair_mut(contexts, edge.source_context, edge.destination_context);
    if let (Some(src), Some(dst)) = (
        source.event_outputs.get(edge.source_port),
        destination.event_inputs.get_mut(edge.destination_port),
    ) {
        dst.extend_from(arena, src);
    }
}

/// Borrow two distinct elements, one shared and one mutable.
#[inline]
fn pair_mut<T>(items: &mut [T], shared: usize, exclusive: usize) -> (&T, &mut T) {
    debug_assert_ne!(shared, exclusive, "edge endpoints must be different nodes");
    if shared < exclusive {
        let (left, right) = items.split_at_mut(exclusive);
        (&left[shared], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(shared);
        (&right[0], &mut left[exclusive])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_mut_both_orders() {
        let mut items = [1, 2, 3, 4];

        let (a, b) = pair_mut(&mut items, 0, 3);
        *b += *a;
        assert_eq!(items, [1, 2, 3, 5]);

        let (a, b) = pair_mut(&mut items, 2, 1);
        *b += *a;
        assert_eq!(items, [1, 5, 3, 5]);
    }
}
