//! Read-only adjacency view over a loaded flow.

use std::collections::HashMap;

use leadflow_types::flow::{Edge, Flow, Node};
use uuid::Uuid;

/// Outgoing-edge index for one execution invocation.
///
/// Edges whose endpoints no longer exist (deleted while editing) are skipped.
pub struct FlowGraph<'a> {
    flow: &'a Flow,
    nodes: HashMap<Uuid, &'a Node>,
    outgoing: HashMap<Uuid, Vec<&'a Edge>>,
}

impl<'a> FlowGraph<'a> {
    pub fn new(flow: &'a Flow) -> Self {
        let nodes: HashMap<Uuid, &Node> = flow.nodes.iter().map(|n| (n.id, n)).collect();

        let mut outgoing: HashMap<Uuid, Vec<&Edge>> = HashMap::new();
        for edge in &flow.edges {
            outgoing.entry(edge.source_node_id).or_default().push(edge);
        }

        Self {
            flow,
            nodes,
            outgoing,
        }
    }

    pub fn flow(&self) -> &'a Flow {
        self.flow
    }

    pub fn node(&self, id: &Uuid) -> Option<&'a Node> {
        self.nodes.get(id).copied()
    }

    /// The run entry point (first `trigger`/`form_submit` node).
    pub fn entry(&self) -> Option<&'a Node> {
        self.flow.trigger_node()
    }

    /// Outgoing edges of `id` with their target nodes, in flow edge order.
    pub fn outgoing(&self, id: &Uuid) -> Vec<(&'a Edge, &'a Node)> {
        let Some(edges) = self.outgoing.get(id) else {
            return Vec::new();
        };

        edges
            .iter()
            .filter_map(|edge| match self.nodes.get(&edge.target_node_id) {
                Some(target) => Some((*edge, *target)),
                None => {
                    tracing::debug!(
                        edge_id = %edge.id,
                        target_node_id = %edge.target_node_id,
                        "skipping edge to missing node"
                    );
                    None
                }
            })
            .collect()
    }

    /// Source and target of an edge, if both still exist.
    pub fn endpoints(&self, edge: &Edge) -> Option<(&'a Node, &'a Node)> {
        Some((
            self.node(&edge.source_node_id)?,
            self.node(&edge.target_node_id)?,
        ))
    }
}
