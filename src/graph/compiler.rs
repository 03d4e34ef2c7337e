// src/graph/compiler.rs
//
// Compiles a Topology (editable) into an ExecutionPlan (runnable).
//
// The schedule is a plain level-by-level topological order:
//
//   group 0   clear / zero every node's buffers
//   group 1   write smoothed parameters into control inputs
//   then, until every node has run:
//     - ProcessNode for every ready node
//     - one copy per outgoing edge of those nodes (serial)
//
// A node is ready once every edge into it has been copied.

use std::collections::HashMap;
use std::sync::Arc;

use super::action::{Action, EdgeRef};
use super::context::NodeBuffers;
use super::plan::ExecutionPlan;
use super::processor::NodeRuntime;
use super::topology::{Node, Topology};
use super::{ConnectionId, DataType, NodeId, PortDirection};
use crate::audio_buffer::SampleBuffer;
use crate::config::EngineConfig;
use crate::error::{CompileError, CompileResult, TopologyError};
use crate::event_buffer::{EventArena, EventBuffer};
use crate::smoother::LinearParameterSmoother;

/// A connection resolved to plan-local indices.
#[derive(Debug, Clone, Copy)]
struct Edge {
    data_type: DataType,
    endpoints: EdgeRef,
    /// Destination parameter range, for control edges.
    range: (f32, f32),
}

/// Compile `topology` into an execution plan.
///
/// Fails on cycles and on connections the destination cannot accept.
/// Runs on the control thread; allocates everything the plan will need.
pub fn compile(topology: &Topology, config: &EngineConfig) -> CompileResult<ExecutionPlan> {
    let mut arena = EventArena::new(config.arena_size_bytes);

    // Map from topology NodeId -> plan context index
    let nodes: Vec<&Node> = topology.nodes().collect();
    let index: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

    // 1. One buffer context per node
    let mut contexts = Vec::with_capacity(nodes.len());
    for node in &nodes {
        contexts.push(build_context(topology, node, config, &mut arena)?);
    }
    let runtimes: Vec<Arc<NodeRuntime>> = nodes.iter().map(|n| Arc::clone(&n.runtime)).collect();

    // 2. Resolve connections into edges, once each
    let mut edges: Vec<Edge> = Vec::new();
    let mut seen: HashMap<ConnectionId, usize> = HashMap::new();
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for node in &nodes {
        for port_id in node.all_ports() {
            let port = topology.port(port_id).ok_or(TopologyError::UnknownPort(port_id))?;

            for &connection_id in &port.connections {
                if seen.contains_key(&connection_id) {
                    continue;
                }

                let edge = resolve_edge(topology, &index, connection_id)?;
                let edge_index = edges.len();
                seen.insert(connection_id, edge_index);
                outgoing[edge.endpoints.source_context].push(edge_index);
                incoming[edge.endpoints.destination_context].push(edge_index);
                edges.push(edge);
            }
        }
    }

    let mut groups: Vec<Vec<Action>> = Vec::new();

    // 3. Clear buffers before anything copies into them
    groups.push(
        contexts
            .iter()
            .enumerate()
            .map(|(context, buffers)| {
                if buffers.has_event_ports() {
                    Action::ClearBuffers { context }
                } else {
                    Action::ZeroInputBuffers { context }
                }
            })
            .collect(),
    );

    // 4. Seed control inputs with the node's own parameters, before
    //    incoming control edges overwrite them
    groups.push(
        contexts
            .iter()
            .enumerate()
            .filter(|(_, buffers)| !buffers.control_inputs.is_empty())
            .map(|(context, _)| Action::WriteParametersToControlInputs { context })
            .collect(),
    );

    // 5. Level-by-level processing
    let mut processed = vec![false; nodes.len()];
    let mut edge_done = vec![false; edges.len()];
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| incoming[i].is_empty()).collect();
    let mut remaining = nodes.len();

    while remaining > 0 {
        if ready.is_empty() {
            log::warn!("Graph compilation failed: {} nodes are part of a cycle", remaining);
            return Err(CompileError::Cycle { remaining });
        }

        groups.push(
            ready
                .iter()
                .map(|&context| Action::ProcessNode { context })
                .collect(),
        );

        let mut copies = Vec::new();
        for &context in &ready {
            for &edge_index in &outgoing[context] {
                copies.push(copy_action(&edges[edge_index]));
                edge_done[edge_index] = true;
            }
            processed[context] = true;
        }
        groups.push(copies);

        let before = remaining;
        remaining -= ready.len();
        debug_assert!(remaining < before);

        ready = (0..nodes.len())
            .filter(|&i| !processed[i] && incoming[i].iter().all(|&e| edge_done[e]))
            .collect();
    }

    groups.retain(|group| !group.is_empty());

    let master_output = topology.master_output().and_then(|id| index.get(&id).copied());

    let plan = ExecutionPlan {
        groups,
        contexts,
        nodes: runtimes,
        arena,
        master_output,
        sample_rate: config.sample_rate,
        max_block_size: config.max_block_size,
    };

    log::debug!(
        "Compiled {} nodes, {} edges into {} groups ({} actions)",
        plan.node_count(),
        edges.len(),
        plan.groups().len(),
        plan.action_count()
    );

    Ok(plan)
}

fn build_context(
    topology: &Topology,
    node: &Node,
    config: &EngineConfig,
    arena: &mut EventArena,
) -> CompileResult<NodeBuffers> {
    let frames = config.max_block_size;
    let port = |id| topology.port(id).ok_or(TopologyError::UnknownPort(id));

    let mut audio_inputs = Vec::with_capacity(node.audio_inputs.len());
    for &id in &node.audio_inputs {
        audio_inputs.push(SampleBuffer::new(port(id)?.channels, frames));
    }

    let mut audio_outputs = Vec::with_capacity(node.audio_outputs.len());
    for &id in &node.audio_outputs {
        audio_outputs.push(SampleBuffer::new(port(id)?.channels, frames));
    }

    let mut smoothers = Vec::with_capacity(node.control_inputs.len());
    for (index, &id) in node.control_inputs.iter().enumerate() {
        let smoothing = port(id)?.parameter.map(|p| p.smoothing_seconds).unwrap_or(0.0);
        let current = node.runtime.parameters().get(index);
        smoothers.push(LinearParameterSmoother::new(current, smoothing));
    }

    let control_inputs = node.control_inputs.iter().map(|_| SampleBuffer::new(1, frames)).collect();
    let control_outputs = node
        .control_outputs
        .iter()
        .map(|_| {
            let mut buffer = SampleBuffer::new(1, frames);
            buffer.fill(f32::NAN);
            buffer
        })
        .collect();

    let mut event_inputs = Vec::with_capacity(node.event_inputs.len());
    for _ in &node.event_inputs {
        event_inputs.push(EventBuffer::new(arena, config.event_buffer_capacity)?);
    }

    let mut event_outputs = Vec::with_capacity(node.event_outputs.len());
    for _ in &node.event_outputs {
        event_outputs.push(EventBuffer::new(arena, config.event_buffer_capacity)?);
    }

    Ok(NodeBuffers {
        node: node.id,
        audio_inputs,
        audio_outputs,
        control_inputs,
        control_outputs,
        event_inputs,
        event_outputs,
        smoothers,
    })
}

fn resolve_edge(
    topology: &Topology,
    index: &HashMap<NodeId, usize>,
    connection_id: ConnectionId,
) -> CompileResult<Edge> {
    let connection = topology
        .connection(connection_id)
        .ok_or(TopologyError::UnknownPort(connection_id))?;
    let source = topology
        .port(connection.source)
        .ok_or(TopologyError::UnknownPort(connection.source))?;
    let destination = topology
        .port(connection.destination)
        .ok_or(TopologyError::UnknownPort(connection.destination))?;

    if source.direction != PortDirection::Output || destination.direction != PortDirection::Input {
        return Err(TopologyError::DirectionMismatch {
            source_port: source.id,
            destination_port: destination.id,
        }
        .into());
    }

    let range = match connection.data_type {
        DataType::Control => {
            let parameter = destination.parameter.ok_or(TopologyError::UnsupportedConnection {
                destination_port: destination.id,
                data_type: DataType::Control,
                reason: "control input has no parameter range",
            })?;
            (parameter.min, parameter.max)
        }
        _ => (0.0, 1.0),
    };

    let source_context = *index.get(&source.node).ok_or(TopologyError::UnknownNode(source.node))?;
    let destination_context = *index
        .get(&destination.node)
        .ok_or(TopologyError::UnknownNode(destination.node))?;

    Ok(Edge {
        data_type: connection.data_type,
        endpoints: EdgeRef {
            source_context,
            source_port: source.index,
            destination_context,
            destination_port: destination.index,
        },
        range,
    })
}

fn copy_action(edge: &Edge) -> Action {
    match edge.data_type {
        DataType::Audio => Action::CopyAudioBuffer {
            edge: edge.endpoints,
        },
        DataType::Control => Action::CopyControlBuffer {
            edge: edge.endpoints,
            min: edge.range.0,
            max: edge.range.1,
        },
        DataType::Event => Action::CopyEvents {
            edge: edge.endpoints,
        },
    }
}
