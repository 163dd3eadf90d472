//! Runtime state for audio graph traversal.

use sm_ir::{AudioBuffer, AudioGraph, NodeId};

/// Per-node output buffers and the traversal order.
pub struct GraphState {
    /// Output buffer for each node (indexed by NodeId).
    pub node_outputs: Vec<AudioBuffer>,
    /// Pre-computed topological traversal order (sources first).
    pub topo_order: Vec<NodeId>,
    /// Input sums for the node being processed.
    pub scratch: [AudioBuffer; 2],
}

impl GraphState {
    /// Build graph state from an AudioGraph, computing the topological order.
    pub fn from_graph(graph: &AudioGraph) -> Self {
        Self {
            node_outputs: (0..graph.nodes.len()).map(|_| AudioBuffer::block()).collect(),
            topo_order: topological_sort(graph),
            scratch: [AudioBuffer::block(), AudioBuffer::block()],
        }
    }

    /// Refresh the order and output slots after the graph changed.
    pub fn rebuild(&mut self, graph: &AudioGraph) {
        self.topo_order = topological_sort(graph);
        self.node_outputs
            .resize_with(graph.nodes.len(), AudioBuffer::block);
    }

    /// Reset all node output buffers to silence.
    pub fn clear_outputs(&mut self) {
        for output in &mut self.node_outputs {
            output.silence();
        }
    }
}

/// Topological sort via Kahn's algorithm.
///
/// Returns nodes ordered so that every source appears before its consumers.
/// Nodes caught in a cycle are left out and never rendered.
pub fn topological_sort(graph: &AudioGraph) -> Vec<NodeId> {
    let n = graph.nodes.len();
    if n == 0 {
        return Vec::new();
    }

    let mut in_degree = vec![0u32; n];
    for conn in &graph.connections {
        if (conn.to as usize) < n {
            in_degree[conn.to as usize] += 1;
        }
    }

    let mut queue: Vec<NodeId> = (0..n as NodeId)
        .filter(|&id| in_degree[id as usize] == 0)
        .collect();

    let mut result = Vec::with_capacity(n);

    while let Some(node_id) = queue.pop() {
        result.push(node_id);

        for conn in &graph.connections {
            if conn.from == node_id && (conn.to as usize) < n {
                in_degree[conn.to as usize] -= 1;
                if in_degree[conn.to as usize] == 0 {
                    queue.push(conn.to);
                }
            }
        }
    }

    if result.len() < n {
        log::warn!("audio graph has a cycle; {} nodes skipped", n - result.len());
    }
    result
}

/// Sum every wire feeding `port` of `node_id` into `scratch`, which is silenced first.
pub fn gather_inputs(
    graph: &AudioGraph,
    node_outputs: &[AudioBuffer],
    node_id: NodeId,
    port: u8,
    scratch: &mut AudioBuffer,
) {
    scratch.silence();
    for conn in graph.inputs(node_id, port) {
        if let Some(src) = node_outputs.get(conn.from as usize) {
            if conn.gain == 1.0 {
                scratch.mix_from(src);
            } else {
                scratch.mix_from_scaled(src, conn.gain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sm_ir::{Connection, DeckId, EffectKind, NodeType};

    #[test]
    fn master_only_graph() {
        let graph = AudioGraph::with_master();
        assert_eq!(topological_sort(&graph), vec![0]);
    }

    #[test]
    fn chain_topology() {
        // deck -> strip -> master
        let mut graph = AudioGraph::with_master();
        let deck = graph.add_node(NodeType::Deck { deck: DeckId::A });
        let strip = graph.add_node(NodeType::Effect { kind: EffectKind::ChannelStrip });
        graph.connect(deck, strip);
        graph.connect(strip, 0);

        let order = topological_sort(&graph);
        assert_eq!(order.len(), 3);
        let pos = |id| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(deck) < pos(strip));
        assert!(pos(strip) < pos(0));
    }

    #[test]
    fn cycle_is_left_out() {
        let mut graph = AudioGraph::with_master();
        let a = graph.add_node(NodeType::Bus);
        let b = graph.add_node(NodeType::Bus);
        graph.connect(a, b);
        graph.connect(b, a);
        let order = topological_sort(&graph);
        assert_eq!(order, vec![0]);
    }

    #[test]
    fn gather_inputs_sums_sources() {
        let mut graph = AudioGraph::with_master();
        let a = graph.add_node(NodeType::Bus);
        let b = graph.add_node(NodeType::Bus);
        graph.connect(a, 0);
        graph.connect(b, 0);

        let mut outputs: Vec<AudioBuffer> = (0..3).map(|_| AudioBuffer::new(2, 1)).collect();
        outputs[a as usize].channel_mut(0)[0] = 0.25;
        outputs[a as usize].channel_mut(1)[0] = 0.5;
        outputs[b as usize].channel_mut(0)[0] = 0.125;

        let mut scratch = AudioBuffer::new(2, 1);
        gather_inputs(&graph, &outputs, 0, 0, &mut scratch);
        assert_eq!(scratch.channel(0)[0], 0.375);
        assert_eq!(scratch.channel(1)[0], 0.5);
    }

    #[test]
    fn gather_inputs_respects_port_and_gain() {
        let mut graph = AudioGraph::with_master();
        let xf = graph.add_node(NodeType::Crossfader);
        let a = graph.add_node(NodeType::Deck { deck: DeckId::A });
        let b = graph.add_node(NodeType::Deck { deck: DeckId::B });
        graph.connect_port(a, xf, 0);
        graph.connections.push(Connection {
            from: b,
            to: xf,
            port: 1,
            gain: 0.5,
        });

        let mut outputs: Vec<AudioBuffer> = (0..4).map(|_| AudioBuffer::new(2, 1)).collect();
        outputs[a as usize].channel_mut(0)[0] = 1.0;
        outputs[b as usize].channel_mut(0)[0] = 1.0;

        let mut scratch = AudioBuffer::new(2, 1);
        gather_inputs(&graph, &outputs, xf, 1, &mut scratch);
        assert_eq!(scratch.channel(0)[0], 0.5);
        gather_inputs(&graph, &outputs, xf, 0, &mut scratch);
        assert_eq!(scratch.channel(0)[0], 1.0);
    }

    #[test]
    fn rebuild_tracks_new_nodes() {
        let mut graph = AudioGraph::with_master();
        let mut state = GraphState::from_graph(&graph);
        let bus = graph.add_node(NodeType::Bus);
        graph.connect(bus, 0);
        state.rebuild(&graph);
        assert_eq!(state.node_outputs.len(), 2);
        assert_eq!(state.topo_order.last(), Some(&0));
    }
}
