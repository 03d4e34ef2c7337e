// src/error.rs
//
// Error types surfaced to the control thread.
//
// The audio thread never returns these. Failures there are counted in
// the engine readback instead.

use thiserror::Error;

use crate::graph::{DataType, NodeId, PortId};
use crate::sequencer::SequenceId;

/// Rejected edit on the topology graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Unknown port {0}")]
    UnknownPort(PortId),

    #[error("Port {source_port} is {source_type:?} but port {destination_port} is {destination_type:?}")]
    TypeMismatch {
        source_port: PortId,
        destination_port: PortId,
        source_type: DataType,
        destination_type: DataType,
    },

    #[error("Connections must run from an output port to an input port ({source_port} -> {destination_port})")]
    DirectionMismatch { source_port: PortId, destination_port: PortId },

    #[error("Cannot connect node {0} to itself")]
    SameNode(NodeId),

    #[error("Ports {source_port} and {destination_port} are already connected")]
    AlreadyConnected { source_port: PortId, destination_port: PortId },

    #[error("Ports {source_port} and {destination_port} are not connected")]
    NotConnected { source_port: PortId, destination_port: PortId },

    #[error("Port {0} is not a parameterized control input")]
    NotAParameter(PortId),

    /// The connection is well-typed but the destination cannot accept it.
    #[error("Unsupported {data_type:?} connection into port {destination_port}: {reason}")]
    UnsupportedConnection {
        destination_port: PortId,
        data_type: DataType,
        reason: &'static str,
    },
}

/// Failure while compiling a topology into an execution plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// No progress was made while nodes were still waiting on inputs.
    #[error("Graph contains a cycle ({remaining} nodes could not be scheduled)")]
    Cycle { remaining: usize },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("Could not allocate event buffers: {0}")]
    Arena(#[from] ArenaError),
}

/// Failure inside the arena allocator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Arena exhausted: requested {requested} bytes, largest free section is {largest_free} bytes")]
    Exhausted { requested: usize, largest_free: usize },

    #[error("Deallocate token {0} does not point at a live section")]
    InvalidToken(usize),
}

/// Failure while compiling the sequence model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Unknown pattern {0}")]
    UnknownPattern(SequenceId),

    #[error("Unknown arrangement {0}")]
    UnknownArrangement(SequenceId),

    #[error("Unknown sequence {0}")]
    UnknownSequence(SequenceId),
}

/// Any failure reported by the engine controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// The audio thread has not taken earlier plans yet.
    #[error("Plan queue is full")]
    PlanQueueFull,
}

pub type TopologyResult<T> = Result<T, TopologyError>;
pub type CompileResult<T> = Result<T, CompileError>;
pub type ArenaResult<T> = Result<T, ArenaError>;
pub type SequenceResult<T> = Result<T, SequenceError>;
pub type EngineResult<T> = Result<T, EngineError>;
