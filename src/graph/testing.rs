// src/graph/testing.rs
//
// Small processors for graph tests.

use std::sync::{Arc, Mutex};

use super::context::{ProcessContext, RenderContext};
use super::plan::ExecutionPlan;
use super::{ParameterConfig, PortConfig, Processor};
use crate::event::{Event, LiveEvent};
use crate::sequencer::{transport, SequenceMap, TransportConfig};

/// Records the order in which logged processors run.
#[derive(Debug, Clone, Default)]
pub struct ProcessLog(Arc<Mutex<Vec<&'static str>>>);

impl ProcessLog {
    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn push(&self, label: &'static str) {
        self.0.lock().unwrap().push(label);
    }
}

/// Run one block of `plan` with a stopped transport and no sequences.
pub fn render_block(plan: &mut ExecutionPlan, num_samples: usize) {
    let (_transport, rt_transport) = transport(TransportConfig::default());
    let sequences = SequenceMap::new();
    let render = RenderContext {
        sample_rate: plan.sample_rate,
        transport: &rt_transport,
        sequences: &sequences,
    };
    plan.process(num_samples, &render);
}

/// Audio in → audio out, multiplied by the "gain" control input.
pub struct Passthrough {
    channels: usize,
    gain: ParameterConfig,
    log: Option<(&'static str, ProcessLog)>,
}

impl Passthrough {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            gain: ParameterConfig::new(1.0, 0.0, 2.0),
            log: None,
        }
    }

    pub fn with_gain(mut self, gain: ParameterConfig) -> Self {
        self.gain = gain;
        self
    }

    pub fn logged(mut self, label: &'static str, log: &ProcessLog) -> Self {
        self.log = Some((label, log.clone()));
        self
    }
}

impl Processor for Passthrough {
    fn name(&self) -> &str {
        "Passthrough"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![
            PortConfig::audio_input(self.channels),
            PortConfig::audio_output(self.channels),
            PortConfig::control_input(self.gain),
        ]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, num_samples: usize) {
        if let Some((label, log)) = &self.log {
            log.push(label);
        }

        let Some((input, output, gain)) = ctx.audio_io_with_control(0, 0, 0) else {
            return;
        };
        for ch in 0..self.channels {
            let source = &input.channel(ch)[..num_samples];
            for ((out, &s), &g) in output.channel_mut(ch)[..num_samples].iter_mut().zip(source).zip(gain) {
                *out = s * g;
            }
        }
    }
}

/// Writes a constant to its mono audio output and its control output.
pub struct ConstantSource {
    value: f32,
    control: f32,
}

impl ConstantSource {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            control: value,
        }
    }

    pub fn with_control(mut self, control: f32) -> Self {
        self.control = control;
        self
    }
}

impl Processor for ConstantSource {
    fn name(&self) -> &str {
        "ConstantSource"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![PortConfig::audio_output(1), PortConfig::control_output()]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, num_samples: usize) {
        if let Some(output) = ctx.audio_output(0) {
            output.channel_mut(0)[..num_samples].fill(self.value);
        }
        if let Some(control) = ctx.control_output(0) {
            control.fill(self.control);
        }
    }
}

/// Pushes one note-on per block.
pub struct EventSource {
    pitch: i16,
}

impl EventSource {
    pub fn new(pitch: i16) -> Self {
        Self { pitch }
    }
}

impl Processor for EventSource {
    fn name(&self) -> &str {
        "EventSource"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![PortConfig::event_output()]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, _num_samples: usize) {
        ctx.push_event(0, LiveEvent::new(0.0, Event::note_on(self.pitch, 1.0)));
    }
}

/// Receives events and has a control input that cannot be connected.
#[derive(Default)]
pub struct EventSink {
    pub received: usize,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Processor for EventSink {
    fn name(&self) -> &str {
        "EventSink"
    }

    fn ports(&self) -> Vec<PortConfig> {
        vec![
            PortConfig::event_input(),
            PortConfig::unparameterized_control_input(),
        ]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, _num_samples: usize) {
        self.received += ctx.input_event_count(0);
    }
}
