// src/graph/processor.rs

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::context::ProcessContext;
use super::{NodeId, PortConfig};

/// Core processing trait.
///
/// Processors:
/// - do NOT know about the graph or scheduling
/// - do NOT allocate in `process`
/// - read inputs and write outputs through the `ProcessContext` only
pub trait Processor: Send {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    /// Ports in declaration order. Queried once when the node is added.
    ///
    /// Within each (type, direction) pair, a port's position in this list
    /// is the index the processor uses to reach it in `ProcessContext`.
    fn ports(&self) -> Vec<PortConfig>;

    /// Called on the control thread before the node is first used.
    fn prepare(&mut self, _sample_rate: f64, _max_block: usize) {}

    /// Render `num_samples` samples.
    ///
    /// The scheduler guarantees that every upstream node has already
    /// run this block and its outputs have been copied into this node's
    /// inputs. Port accessors on `ctx` return `None` for an index the
    /// node did not declare.
    fn process(&mut self, ctx: &mut ProcessContext<'_>, num_samples: usize);
}

/// Current parameter values of one node, one slot per control input.
///
/// Written by the control thread, read by the audio thread. Values are
/// stored as f32 bits (no AtomicF32 in std).
#[derive(Debug)]
pub struct ParameterValues {
    values: Vec<AtomicU32>,
}

impl ParameterValues {
    pub fn new(initial: impl IntoIterator<Item = f32>) -> Self {
        Self {
            values: initial
                .into_iter()
                .map(|v| AtomicU32::new(v.to_bits()))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.values
            .get(index)
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    #[inline]
    pub fn set(&self, index: usize, value: f32) {
        if let Some(slot) = self.values.get(index) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The part of a node that execution plans keep alive.
///
/// Shared between the topology and every plan compiled from it. The
/// audio thread is the only one that locks the processor once the node
/// has been added.
pub struct NodeRuntime {
    id: NodeId,
    name: String,
    processor: Mutex<Box<dyn Processor>>,
    parameters: ParameterValues,
}

impl NodeRuntime {
    pub(crate) fn new(
        id: NodeId,
        processor: Box<dyn Processor>,
        parameters: ParameterValues,
    ) -> Self {
        Self {
            id,
            name: processor.name().to_string(),
            processor: Mutex::new(processor),
            parameters,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterValues {
        &self.parameters
    }

    #[inline]
    pub(crate) fn processor(&self) -> &Mutex<Box<dyn Processor>> {
        &self.processor
    }
}

impl std::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRuntime")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_values() {
        let params = ParameterValues::new([1.0, 0.5]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(1), 0.5);

        params.set(1, 0.25);
        assert_eq!(params.get(1), 0.25);

        // Out of range is ignored on write and reads as zero
        params.set(5, 3.0);
        assert_eq!(params.get(5), 0.0);
    }
}
