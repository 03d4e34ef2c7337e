//! Processing graph: topology, compiler and real-time scheduler.
//!
//! The control thread edits a [`Topology`], compiles it into an
//! [`ExecutionPlan`] and submits the plan through a [`PlanSubmitter`].
//! The audio thread owns a [`GraphProcessor`], which adopts new plans at
//! block boundaries and runs the active one every block.

mod action;
mod compiler;
mod context;
mod plan;
mod processor;
pub mod scheduler;
mod topology;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, EdgeRef};
pub use compiler::compile;
pub use context::{NodeBuffers, ProcessContext, RenderContext};
pub use plan::{BlockStats, ExecutionPlan};
pub use processor::{NodeRuntime, ParameterValues, Processor};
pub use scheduler::{GraphProcessor, PlanSubmitter, ProcessorStats};
pub use topology::{Connection, Node, Port, Topology};

/// Identifies a node in the topology.
pub type NodeId = u64;

/// Identifies a port in the topology.
pub type PortId = u64;

/// Identifies a connection in the topology.
pub type ConnectionId = u64;

/// What flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Sample-rate audio, one lane per channel.
    Audio,
    /// Sample-rate control values, one lane.
    Control,
    /// Timestamped note events.
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

/// Range and smoothing of the parameter behind a control input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterConfig {
    pub default: f32,
    pub min: f32,
    pub max: f32,
    /// Ramp time for value changes, in seconds.
    pub smoothing_seconds: f32,
}

impl ParameterConfig {
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        Self {
            default,
            min,
            max,
            smoothing_seconds: 0.0,
        }
    }

    pub fn smoothed(mut self, seconds: f32) -> Self {
        self.smoothing_seconds = seconds;
        self
    }

    /// Map a normalized [0, 1] value into this range.
    #[inline]
    pub fn denormalize(&self, normalized: f32) -> f32 {
        normalized * (self.max - self.min) + self.min
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

/// Port declared by a processor.
#[derive(Debug, Clone, PartialEq)]
pub struct PortConfig {
    pub data_type: DataType,
    pub direction: PortDirection,
    /// Audio channel count. Control and event ports use 1.
    pub channels: usize,
    /// Only for control inputs.
    pub parameter: Option<ParameterConfig>,
}

impl PortConfig {
    pub fn audio_input(channels: usize) -> Self {
        Self {
            data_type: DataType::Audio,
            direction: PortDirection::Input,
            channels,
            parameter: None,
        }
    }

    pub fn audio_output(channels: usize) -> Self {
        Self {
            data_type: DataType::Audio,
            direction: PortDirection::Output,
            channels,
            parameter: None,
        }
    }

    pub fn control_input(parameter: ParameterConfig) -> Self {
        Self {
            data_type: DataType::Control,
            direction: PortDirection::Input,
            channels: 1,
            parameter: Some(parameter),
        }
    }

    /// Control input without a parameter. Cannot receive connections.
    pub fn unparameterized_control_input() -> Self {
        Self {
            data_type: DataType::Control,
            direction: PortDirection::Input,
            channels: 1,
            parameter: None,
        }
    }

    pub fn control_output() -> Self {
        Self {
            data_type: DataType::Control,
            direction: PortDirection::Output,
            channels: 1,
            parameter: None,
        }
    }

    pub fn event_input() -> Self {
        Self {
            data_type: DataType::Event,
            direction: PortDirection::Input,
            channels: 1,
            parameter: None,
        }
    }

    pub fn event_output() -> Self {
        Self {
            data_type: DataType::Event,
            direction: PortDirection::Output,
            channels: 1,
            parameter: None,
        }
    }
}
