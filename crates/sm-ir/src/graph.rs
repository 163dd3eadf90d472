//! Audio graph description: nodes and the wires between them.

use alloc::vec::Vec;

use crate::deck::DeckId;
use crate::track::TrackKey;

/// Node identifier in the audio graph.
pub type NodeId = u16;

/// Kind of processing unit behind an effect node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    Compressor,
    Reverb,
    Delay,
    Filter,
    Eq,
    /// Gain plus equal-power pan
    ChannelStrip,
    Gain,
    SoftClip,
}

/// Type of audio graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    /// Final output, tapped by the recorder
    Master,
    /// Summing point with no processing
    Bus,
    /// Voices of one track's instrument
    Instrument { track: TrackKey },
    /// Deck player
    Deck { deck: DeckId },
    /// Two-input blend of deck A (port 0) and deck B (port 1)
    Crossfader,
    /// In-place effect unit
    Effect { kind: EffectKind },
    /// Removed node awaiting reuse
    Vacant,
}

impl NodeType {
    /// Short display label.
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::Master => "Master",
            NodeType::Bus => "Bus",
            NodeType::Instrument { .. } => "Instrument",
            NodeType::Deck { deck: DeckId::A } => "Deck A",
            NodeType::Deck { deck: DeckId::B } => "Deck B",
            NodeType::Crossfader => "Crossfader",
            NodeType::Effect { kind } => match kind {
                EffectKind::Compressor => "Compressor",
                EffectKind::Reverb => "Reverb",
                EffectKind::Delay => "Delay",
                EffectKind::Filter => "Filter",
                EffectKind::Eq => "EQ",
                EffectKind::ChannelStrip => "Strip",
                EffectKind::Gain => "Gain",
                EffectKind::SoftClip => "Soft Clip",
            },
            NodeType::Vacant => "-",
        }
    }
}

/// A node in the audio graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
}

/// Wire from one node's output into an input port of another.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Connection {
    /// Source node
    pub from: NodeId,
    /// Destination node
    pub to: NodeId,
    /// Destination input port (0 for single-input nodes)
    pub port: u8,
    /// Linear gain applied on this wire
    pub gain: f32,
}

/// The audio processing graph.
#[derive(Clone, Debug, Default)]
pub struct AudioGraph {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl AudioGraph {
    /// Create a graph holding only the master node (id 0).
    pub fn with_master() -> Self {
        Self {
            nodes: alloc::vec![Node {
                id: 0,
                node_type: NodeType::Master,
            }],
            connections: Vec::new(),
        }
    }

    /// Add a node, reusing a vacant slot when one exists.
    pub fn add_node(&mut self, node_type: NodeType) -> NodeId {
        if let Some(node) = self
            .nodes
            .iter_mut()
            .find(|n| n.node_type == NodeType::Vacant)
        {
            node.node_type = node_type;
            return node.id;
        }
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node { id, node_type });
        id
    }

    /// Vacate a node and drop every wire touching it. The master node stays.
    pub fn remove_node(&mut self, id: NodeId) {
        if id == 0 {
            return;
        }
        if let Some(node) = self.nodes.get_mut(id as usize) {
            node.node_type = NodeType::Vacant;
        }
        self.connections.retain(|c| c.from != id && c.to != id);
    }

    /// Connect `from` into port 0 of `to` at unity gain.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.connect_port(from, to, 0);
    }

    /// Connect `from` into a specific input port of `to`.
    pub fn connect_port(&mut self, from: NodeId, to: NodeId, port: u8) {
        let exists = self
            .connections
            .iter()
            .any(|c| c.from == from && c.to == to && c.port == port);
        if !exists {
            self.connections.push(Connection {
                from,
                to,
                port,
                gain: 1.0,
            });
        }
    }

    /// Remove every wire from `from` to `to`.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        self.connections.retain(|c| !(c.from == from && c.to == to));
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Wires feeding `port` of `id`.
    pub fn inputs(&self, id: NodeId, port: u8) -> impl Iterator<Item = &Connection> + '_ {
        self.connections
            .iter()
            .filter(move |c| c.to == id && c.port == port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_connections_are_ignored() {
        let mut graph = AudioGraph::with_master();
        let bus = graph.add_node(NodeType::Bus);
        graph.connect(bus, 0);
        graph.connect(bus, 0);
        assert_eq!(graph.connections.len(), 1);
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut graph = AudioGraph::with_master();
        let a = graph.add_node(NodeType::Bus);
        let b = graph.add_node(NodeType::Crossfader);
        graph.connect(a, b);
        graph.connect(b, 0);
        graph.remove_node(a);
        assert_eq!(graph.connections.len(), 1);

        let c = graph.add_node(NodeType::Effect { kind: EffectKind::Gain });
        assert_eq!(c, a);
        assert_eq!(graph.nodes.len(), 3);
    }

    #[test]
    fn master_cannot_be_removed() {
        let mut graph = AudioGraph::with_master();
        graph.remove_node(0);
        assert_eq!(graph.node(0).map(|n| n.node_type), Some(NodeType::Master));
    }

    #[test]
    fn inputs_filter_by_port() {
        let mut graph = AudioGraph::with_master();
        let a = graph.add_node(NodeType::Deck { deck: DeckId::A });
        let b = graph.add_node(NodeType::Deck { deck: DeckId::B });
        let xf = graph.add_node(NodeType::Crossfader);
        graph.connect_port(a, xf, 0);
        graph.connect_port(b, xf, 1);
        let port1: Vec<NodeId> = graph.inputs(xf, 1).map(|c| c.from).collect();
        assert_eq!(port1, vec![b]);
    }
}
