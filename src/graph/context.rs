// src/graph/context.rs
//
// Per-node runtime buffers and the view a processor gets of them.

use super::NodeId;
use crate::audio_buffer::SampleBuffer;
use crate::event::LiveEvent;
use crate::event_buffer::{EventArena, EventBuffer};
use crate::sequencer::{RtTransport, SequenceMap};
use crate::smoother::LinearParameterSmoother;

use super::processor::ParameterValues;

/// Block-wide state handed to every processor.
///
/// Passed explicitly into `process` so processors never reach for a
/// global engine instance.
pub struct RenderContext<'a> {
    pub sample_rate: f64,
    pub transport: &'a RtTransport,
    pub sequences: &'a SequenceMap,
}

/// Buffers owned by one node within one execution plan.
///
/// Created by the compiler, sized to the node's ports, and reused for
/// every block the plan runs.
#[derive(Debug)]
pub struct NodeBuffers {
    pub(crate) node: NodeId,

    pub(crate) audio_inputs: Vec<SampleBuffer>,
    pub(crate) audio_outputs: Vec<SampleBuffer>,
    pub(crate) control_inputs: Vec<SampleBuffer>,
    pub(crate) control_outputs: Vec<SampleBuffer>,
    pub(crate) event_inputs: Vec<EventBuffer>,
    pub(crate) event_outputs: Vec<EventBuffer>,

    /// One per control input.
    pub(crate) smoothers: Vec<LinearParameterSmoother>,
}

impl NodeBuffers {
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn audio_input(&self, index: usize) -> Option<&SampleBuffer> {
        self.audio_inputs.get(index)
    }

    #[inline]
    pub fn audio_output(&self, index: usize) -> Option<&SampleBuffer> {
        self.audio_outputs.get(index)
    }

    #[inline]
    pub fn control_input(&self, index: usize) -> Option<&SampleBuffer> {
        self.control_inputs.get(index)
    }

    #[inline]
    pub fn event_input(&self, index: usize) -> Option<&EventBuffer> {
        self.event_inputs.get(index)
    }

    #[inline]
    pub fn event_output(&self, index: usize) -> Option<&EventBuffer> {
        self.event_outputs.get(index)
    }

    pub fn has_event_ports(&self) -> bool {
        !self.event_inputs.is_empty() || !self.event_outputs.is_empty()
    }

    /// Zero audio inputs so copies can accumulate into them, and mark
    /// control outputs as "no value" (NaN).
    pub(crate) fn zero_inputs(&mut self) {
        for buffer in &mut self.audio_inputs {
            buffer.clear();
        }
        for buffer in &mut self.control_outputs {
            buffer.fill(f32::NAN);
        }
    }

    /// `zero_inputs`, plus empty every event buffer.
    pub(crate) fn clear(&mut self) {
        self.zero_inputs();
        for buffer in self.event_inputs.iter_mut().chain(&mut self.event_outputs) {
            buffer.clear();
        }
    }

    /// Collect and reset the dropped-event counters of every event buffer.
    pub(crate) fn take_dropped_events(&mut self) -> usize {
        self.event_inputs
            .iter_mut()
            .chain(&mut self.event_outputs)
            .map(EventBuffer::take_dropped)
            .sum()
    }
}

/// A processor's view of its own buffers for one block.
pub struct ProcessContext<'a> {
    buffers: &'a mut NodeBuffers,
    arena: &'a mut EventArena,
    parameters: &'a ParameterValues,
    render: &'a RenderContext<'a>,
    num_samples: usize,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        buffers: &'a mut NodeBuffers,
        arena: &'a mut EventArena,
        parameters: &'a ParameterValues,
        render: &'a RenderContext<'a>,
        num_samples: usize,
    ) -> Self {
        Self {
            buffers,
            arena,
            parameters,
            render,
            num_samples,
        }
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.render.sample_rate
    }

    /// Block-wide state. Not tied to this borrow of the context.
    #[inline]
    pub fn render(&self) -> &'a RenderContext<'a> {
        self.render
    }

    /// Latest value of the parameter behind control input `index`,
    /// without smoothing.
    #[inline]
    pub fn parameter(&self, index: usize) -> f32 {
        self.parameters.get(index)
    }

    // -------------------------------
    // MARK: Audio
    // -------------------------------

    /// `None` if the node declared no audio input at `index`.
    #[inline]
    pub fn audio_input(&self, index: usize) -> Option<&SampleBuffer> {
        self.buffers.audio_inputs.get(index)
    }

    #[inline]
    pub fn audio_output(&mut self, index: usize) -> Option<&mut SampleBuffer> {
        self.buffers.audio_outputs.get_mut(index)
    }

    /// An input and an output at the same time.
    #[inline]
    pub fn audio_io(&mut self, input: usize, output: usize) -> Option<(&SampleBuffer, &mut SampleBuffer)> {
        let buffers = &mut *self.buffers;
        Some((
            buffers.audio_inputs.get(input)?,
            buffers.audio_outputs.get_mut(output)?,
        ))
    }

    /// An audio input, an audio output and a control input together,
    /// for processors that modulate audio per sample.
    #[inline]
    pub fn audio_io_with_control(
        &mut self,
        input: usize,
        output: usize,
        control: usize,
    ) -> Option<(&SampleBuffer, &mut SampleBuffer, &[f32])> {
        let n = self.num_samples;
        let buffers = &mut *self.buffers;
        Some((
            buffers.audio_inputs.get(input)?,
            buffers.audio_outputs.get_mut(output)?,
            &buffers.control_inputs.get(control)?.channel(0)[..n],
        ))
    }

    // -------------------------------
    // MARK: Control
    // -------------------------------

    /// Smoothed and connection-driven values for this block.
    #[inline]
    pub fn control_input(&self, index: usize) -> Option<&[f32]> {
        let n = self.num_samples;
        self.buffers
            .control_inputs
            .get(index)
            .map(|buffer| &buffer.channel(0)[..n])
    }

    /// Samples left as NaN are ignored by downstream nodes.
    #[inline]
    pub fn control_output(&mut self, index: usize) -> Option<&mut [f32]> {
        let n = self.num_samples;
        self.buffers
            .control_outputs
            .get_mut(index)
            .map(|buffer| &mut buffer.channel_mut(0)[..n])
    }

    // -------------------------------
    // MARK: Events
    // -------------------------------

    /// Events on input `index`. Empty if there is no such input.
    pub fn input_events(&self, index: usize) -> impl Iterator<Item = LiveEvent> + '_ {
        let arena = &*self.arena;
        self.buffers
            .event_inputs
            .get(index)
            .into_iter()
            .flat_map(move |buffer| buffer.iter(arena))
    }

    #[inline]
    pub fn input_event_count(&self, index: usize) -> usize {
        self.buffers.event_inputs.get(index).map_or(0, EventBuffer::len)
    }

    /// Append an event to output `index`.
    ///
    /// Returns `false` if the event was dropped, either because the
    /// plan's arena is out of space or because there is no such output.
    #[inline]
    pub fn push_event(&mut self, index: usize, event: LiveEvent) -> bool {
        match self.buffers.event_outputs.get_mut(index) {
            Some(buffer) => buffer.push(&mut *self.arena, event),
            None => false,
        }
    }
}
