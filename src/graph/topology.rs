// src/graph/topology.rs
//
// Mutable node/port/connection graph, edited by the control thread.
//
// Nodes, ports and connections live in id-keyed tables. Ports and
// connections refer to each other and to their node by id only, so
// removal is "erase by id" and a stale id fails the lookup instead of
// reaching freed memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::processor::{NodeRuntime, ParameterValues, Processor};
use super::{ConnectionId, DataType, NodeId, ParameterConfig, PortDirection, PortId};
use crate::error::{TopologyError, TopologyResult};

/// A processor instance and its ports.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub runtime: Arc<NodeRuntime>,

    pub audio_inputs: Vec<PortId>,
    pub audio_outputs: Vec<PortId>,
    pub control_inputs: Vec<PortId>,
    pub control_outputs: Vec<PortId>,
    pub event_inputs: Vec<PortId>,
    pub event_outputs: Vec<PortId>,
}

impl Node {
    /// Ports of one kind, in declaration order.
    pub fn ports(&self, data_type: DataType, direction: PortDirection) -> &[PortId] {
        match (data_type, direction) {
            (DataType::Audio, PortDirection::Input) => &self.audio_inputs,
            (DataType::Audio, PortDirection::Output) => &self.audio_outputs,
            (DataType::Control, PortDirection::Input) => &self.control_inputs,
            (DataType::Control, PortDirection::Output) => &self.control_outputs,
            (DataType::Event, PortDirection::Input) => &self.event_inputs,
            (DataType::Event, PortDirection::Output) => &self.event_outputs,
        }
    }

    pub fn all_ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.audio_inputs
            .iter()
            .chain(&self.audio_outputs)
            .chain(&self.control_inputs)
            .chain(&self.control_outputs)
            .chain(&self.event_inputs)
            .chain(&self.event_outputs)
            .copied()
    }

    pub fn audio_input(&self, index: usize) -> Option<PortId> {
        self.audio_inputs.get(index).copied()
    }

    pub fn audio_output(&self, index: usize) -> Option<PortId> {
        self.audio_outputs.get(index).copied()
    }

    pub fn control_input(&self, index: usize) -> Option<PortId> {
        self.control_inputs.get(index).copied()
    }

    pub fn control_output(&self, index: usize) -> Option<PortId> {
        self.control_outputs.get(index).copied()
    }

    pub fn event_input(&self, index: usize) -> Option<PortId> {
        self.event_inputs.get(index).copied()
    }

    pub fn event_output(&self, index: usize) -> Option<PortId> {
        self.event_outputs.get(index).copied()
    }
}

/// A typed connection point on a node.
#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub node: NodeId,
    pub data_type: DataType,
    pub direction: PortDirection,
    /// Position among the node's ports of the same type and direction.
    pub index: usize,
    pub channels: usize,
    pub parameter: Option<ParameterConfig>,
    pub connections: Vec<ConnectionId>,
}

/// Output port → input port, same data type on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: PortId,
    pub destination: PortId,
    pub data_type: DataType,
}

/// The editable graph.
///
/// Nothing here is safe to touch from the audio thread; the audio
/// thread only ever sees compiled plans.
#[derive(Debug, Default)]
pub struct Topology {
    // BTreeMap so iteration (and thus compilation) is deterministic
    nodes: BTreeMap<NodeId, Node>,
    ports: HashMap<PortId, Port>,
    connections: HashMap<ConnectionId, Connection>,
    master_output: Option<NodeId>,
    next_id: u64,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // -------------------------------
    // MARK: Nodes
    // -------------------------------

    /// Add a node for `processor`, creating one port per declared port.
    pub fn add_node(&mut self, processor: Box<dyn Processor>) -> NodeId {
        let id = self.allocate_id();
        let configs = processor.ports();

        let defaults = configs
            .iter()
            .filter(|c| c.data_type == DataType::Control && c.direction == PortDirection::Input)
            .map(|c| c.parameter.map(|p| p.default).unwrap_or(0.0));
        let runtime = Arc::new(NodeRuntime::new(id, processor, ParameterValues::new(defaults)));

        let mut node = Node {
            id,
            runtime,
            audio_inputs: Vec::new(),
            audio_outputs: Vec::new(),
            control_inputs: Vec::new(),
            control_outputs: Vec::new(),
            event_inputs: Vec::new(),
            event_outputs: Vec::new(),
        };

        for config in configs {
            let port_id = self.allocate_id();
            let list = match (config.data_type, config.direction) {
                (DataType::Audio, PortDirection::Input) => &mut node.audio_inputs,
                (DataType::Audio, PortDirection::Output) => &mut node.audio_outputs,
                (DataType::Control, PortDirection::Input) => &mut node.control_inputs,
                (DataType::Control, PortDirection::Output) => &mut node.control_outputs,
                (DataType::Event, PortDirection::Input) => &mut node.event_inputs,
                (DataType::Event, PortDirection::Output) => &mut node.event_outputs,
            };

            self.ports.insert(
                port_id,
                Port {
                    id: port_id,
                    node: id,
                    data_type: config.data_type,
                    direction: config.direction,
                    index: list.len(),
                    channels: config.channels.max(1),
                    parameter: config.parameter,
                    connections: Vec::new(),
                },
            );
            list.push(port_id);
        }

        log::debug!("Added node {} ({})", id, node.runtime.name());
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node, severing all of its connections first.
    ///
    /// Plans already compiled keep the node's runtime alive until they
    /// are reclaimed.
    pub fn remove_node(&mut self, id: NodeId) -> TopologyResult<()> {
        let node = self.nodes.get(&id).ok_or(TopologyError::UnknownNode(id))?;

        let port_ids: Vec<PortId> = node.all_ports().collect();
        let connection_ids: Vec<ConnectionId> = port_ids
            .iter()
            .filter_map(|p| self.ports.get(p))
            .flat_map(|p| p.connections.iter().copied())
            .collect();

        for connection in connection_ids {
            self.remove_connection(connection);
        }

        for port in port_ids {
            self.ports.remove(&port);
        }

        self.nodes.remove(&id);
        if self.master_output == Some(id) {
            self.master_output = None;
        }

        log::debug!("Removed node {}", id);
        Ok(())
    }

    // -------------------------------
    // MARK: Connections
    // -------------------------------

    /// Connect an output port to an input port of the same data type.
    pub fn connect(&mut self, source: PortId, destination: PortId) -> TopologyResult<ConnectionId> {
        let (source_port, destination_port) = self.port_pair(source, destination)?;

        if source_port.direction != PortDirection::Output
            || destination_port.direction != PortDirection::Input
        {
            return Err(TopologyError::DirectionMismatch {
                source_port: source,
                destination_port: destination,
            });
        }

        if source_port.node == destination_port.node {
            return Err(TopologyError::SameNode(source_port.node));
        }

        if self.find_connection(source, destination).is_some() {
            return Err(TopologyError::AlreadyConnected {
                source_port: source,
                destination_port: destination,
            });
        }

        let data_type = source_port.data_type;
        if data_type == DataType::Control && destination_port.parameter.is_none() {
            return Err(TopologyError::UnsupportedConnection {
                destination_port: destination,
                data_type,
                reason: "control input has no parameter range",
            });
        }

        let id = self.allocate_id();
        self.connections.insert(
            id,
            Connection {
                id,
                source,
                destination,
                data_type,
            },
        );

        for port in [source, destination] {
            if let Some(port) = self.ports.get_mut(&port) {
                port.connections.push(id);
            }
        }

        log::debug!("Connected port {} -> {} ({:?})", source, destination, data_type);
        Ok(id)
    }

    /// Remove the connection between two ports.
    pub fn disconnect(&mut self, source: PortId, destination: PortId) -> TopologyResult<()> {
        self.port_pair(source, destination)?;

        let id = self
            .find_connection(source, destination)
            .ok_or(TopologyError::NotConnected {
                source_port: source,
                destination_port: destination,
            })?;

        self.remove_connection(id);
        log::debug!("Disconnected port {} -> {}", source, destination);
        Ok(())
    }

    /// Look up both ports and check that their data types agree.
    fn port_pair(&self, source: PortId, destination: PortId) -> TopologyResult<(&Port, &Port)> {
        let source_port = self.ports.get(&source).ok_or(TopologyError::UnknownPort(source))?;
        let destination_port = self
            .ports
            .get(&destination)
            .ok_or(TopologyError::UnknownPort(destination))?;

        if source_port.data_type != destination_port.data_type {
            return Err(TopologyError::TypeMismatch {
                source_port: source,
                destination_port: destination,
                source_type: source_port.data_type,
                destination_type: destination_port.data_type,
            });
        }

        Ok((source_port, destination_port))
    }

    fn find_connection(&self, source: PortId, destination: PortId) -> Option<ConnectionId> {
        self.ports.get(&source)?.connections.iter().copied().find(|c| {
            self.connections
                .get(c)
                .is_some_and(|c| c.source == source && c.destination == destination)
        })
    }

    fn remove_connection(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.remove(&id) {
            for port in [connection.source, connection.destination] {
                if let Some(port) = self.ports.get_mut(&port) {
                    port.connections.retain(|&c| c != id);
                }
            }
        }
    }

    // -------------------------------
    // MARK: Parameters and output
    // -------------------------------

    /// Set the parameter behind a control input port.
    ///
    /// Takes effect on the next block without recompiling. The value is
    /// clamped to the parameter's range.
    pub fn set_parameter(&mut self, port: PortId, value: f32) -> TopologyResult<()> {
        let port = self.ports.get(&port).ok_or(TopologyError::UnknownPort(port))?;

        let parameter = match (port.data_type, port.direction, port.parameter) {
            (DataType::Control, PortDirection::Input, Some(parameter)) => parameter,
            _ => return Err(TopologyError::NotAParameter(port.id)),
        };

        let node = self
            .nodes
            .get(&port.node)
            .ok_or(TopologyError::UnknownNode(port.node))?;
        node.runtime.parameters().set(port.index, parameter.clamp(value));
        Ok(())
    }

    /// Current value of the parameter behind a control input port.
    pub fn parameter(&self, port: PortId) -> TopologyResult<f32> {
        let port = self.ports.get(&port).ok_or(TopologyError::UnknownPort(port))?;
        if port.parameter.is_none() {
            return Err(TopologyError::NotAParameter(port.id));
        }
        let node = self
            .nodes
            .get(&port.node)
            .ok_or(TopologyError::UnknownNode(port.node))?;
        Ok(node.runtime.parameters().get(port.index))
    }

    /// Choose the node whose first audio input the host reads.
    pub fn set_master_output(&mut self, id: NodeId) -> TopologyResult<()> {
        if !self.nodes.contains_key(&id) {
            return Err(TopologyError::UnknownNode(id));
        }
        self.master_output = Some(id);
        Ok(())
    }

    #[inline]
    pub fn master_output(&self) -> Option<NodeId> {
        self.master_output
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
