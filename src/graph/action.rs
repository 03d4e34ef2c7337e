// src/graph/action.rs

/// Endpoints of a compiled edge, as plan-local indices.
///
/// `*_context` indexes the plan's node contexts; `*_port` is the port's
/// position among that node's ports of the edge's data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRef {
    pub source_context: usize,
    pub source_port: usize,
    pub destination_context: usize,
    pub destination_port: usize,
}

/// One step of an execution plan.
///
/// Actions are immutable once compiled. Executing them never allocates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Zero audio inputs, reset control outputs and empty every event
    /// buffer of a node.
    ClearBuffers { context: usize },

    /// Zero audio inputs and reset control outputs of a node without
    /// event ports.
    ZeroInputBuffers { context: usize },

    /// Ramp each control input towards the node's current parameter
    /// value, writing the ramp into the control input buffer.
    WriteParametersToControlInputs { context: usize },

    /// Run the node's processor.
    ProcessNode { context: usize },

    /// Add the source audio into the destination (fan-in sums).
    CopyAudioBuffer { edge: EdgeRef },

    /// Overwrite the destination control buffer with the source scaled
    /// from [0, 1] into [min, max]. NaN source samples are skipped.
    CopyControlBuffer { edge: EdgeRef, min: f32, max: f32 },

    /// Append every source event to the destination.
    CopyEvents { edge: EdgeRef },
}

impl Action {
    /// Whether this action may run concurrently with the other actions
    /// of its group.
    ///
    /// Copies are serial because several edges can target one buffer.
    pub const fn is_parallel_safe(&self) -> bool {
        match self {
            Action::ClearBuffers { .. }
            | Action::ZeroInputBuffers { .. }
            | Action::WriteParametersToControlInputs { .. }
            | Action::ProcessNode { .. } => true,
            Action::CopyAudioBuffer { .. }
            | Action::CopyControlBuffer { .. }
            | Action::CopyEvents { .. } => false,
        }
    }

    /// The node context this action runs on, for node-level actions.
    pub const fn context(&self) -> Option<usize> {
        match self {
            Action::ClearBuffers { context }
            | Action::ZeroInputBuffers { context }
            | Action::WriteParametersToControlInputs { context }
            | Action::ProcessNode { context } => Some(*context),
            _ => None,
        }
    }

    /// The edge this action copies along, for copy actions.
    pub const fn edge(&self) -> Option<EdgeRef> {
        match self {
            Action::CopyAudioBuffer { edge }
            | Action::CopyControlBuffer { edge, .. }
            | Action::CopyEvents { edge } => Some(*edge),
            _ => None,
        }
    }
}
