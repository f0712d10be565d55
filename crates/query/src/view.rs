use index::{GraphSnapshot, SnapshotEdge, SnapshotNode};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

const SHORT_EVIDENCE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighbor {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display label of the connecting edge.
    pub relation: String,
    pub relation_type: String,
    pub direction: EdgeDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDetail {
    pub node: SnapshotNode,
    pub neighbors: Vec<Neighbor>,
}

/// Text shown on an edge: its note, else short evidence, else the type in
/// words.
pub fn edge_label(edge: &SnapshotEdge) -> String {
    if !edge.note.is_empty() {
        return edge.note.clone();
    }
    if !edge.evidence.is_empty() && edge.evidence.chars().count() < SHORT_EVIDENCE_CHARS {
        return edge.evidence.clone();
    }
    edge.edge_type.to_lowercase().replace('_', " ")
}

/// Read-only, in-memory view of the graph for presentation.
#[derive(Debug, Default)]
pub struct GraphView {
    graph: DiGraph<SnapshotNode, SnapshotEdge>,
    index: HashMap<String, NodeIndex>,
}

impl GraphView {
    /// Edges whose endpoints are not in the snapshot are left out; a repeated
    /// node id keeps its first occurrence.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut view = Self::default();

        for node in snapshot.nodes {
            if view.index.contains_key(&node.id) {
                continue;
            }
            let id = node.id.clone();
            let idx = view.graph.add_node(node);
            view.index.insert(id, idx);
        }

        let mut dangling = 0;
        for edge in snapshot.edges {
            match (view.index.get(&edge.source), view.index.get(&edge.target)) {
                (Some(&source), Some(&target)) => {
                    view.graph.add_edge(source, target, edge);
                }
                _ => dangling += 1,
            }
        }
        if dangling > 0 {
            tracing::debug!(dangling, "Skipped edges with unknown endpoints");
        }

        view
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn full_graph(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self.graph.edge_weights().cloned().collect(),
        }
    }

    /// The node and everything directly connected to it, outgoing edges first.
    pub fn select_node(&self, id: &str) -> Option<NodeDetail> {
        let &idx = self.index.get(id)?;

        let mut neighbors = Vec::new();
        for (direction, petgraph_direction) in [
            (EdgeDirection::Outgoing, Direction::Outgoing),
            (EdgeDirection::Incoming, Direction::Incoming),
        ] {
            for edge in self.graph.edges_directed(idx, petgraph_direction) {
                let other = match direction {
                    EdgeDirection::Outgoing => edge.target(),
                    EdgeDirection::Incoming => edge.source(),
                };
                let node = &self.graph[other];
                neighbors.push(Neighbor {
                    id: node.id.clone(),
                    label: node.label.clone(),
                    node_type: node.node_type.clone(),
                    relation: edge_label(edge.weight()),
                    relation_type: edge.weight().edge_type.clone(),
                    direction,
                });
            }
        }

        Some(NodeDetail {
            node: self.graph[idx].clone(),
            neighbors,
        })
    }

    /// Sub-graph of the node, its direct neighbours and the edges touching it.
    pub fn neighborhood(&self, id: &str) -> Option<GraphSnapshot> {
        let &idx = self.index.get(id)?;

        let mut members = BTreeSet::from([idx]);
        let mut edges = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for edge in self.graph.edges_directed(idx, direction) {
                // a self-loop shows up in both directions
                if direction == Direction::Incoming && edge.source() == edge.target() {
                    continue;
                }
                members.insert(edge.source());
                members.insert(edge.target());
                edges.push(edge.weight().clone());
            }
        }

        Some(GraphSnapshot {
            nodes: members.into_iter().map(|m| self.graph[m].clone()).collect(),
            edges,
        })
    }

    /// Nodes whose label or id contains `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Vec<SnapshotNode> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.graph
            .node_weights()
            .filter(|node| {
                node.label.to_lowercase().contains(&needle) || node.id.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }
}
