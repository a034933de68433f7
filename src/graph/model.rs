//! The immutable-after-load graph model.
//!
//! [`Graph`] is a node registry plus a flat edge list and a designated
//! start node. It is populated once by the [loader](crate::graph::loader)
//! (or programmatically in tests) and is read-only during traversal; the
//! only mutation after load happens in [`crate::state::NodeAnnotations`],
//! which lives outside the graph precisely so the graph can be shared
//! freely across concurrent workflow tasks.

use rustc_hash::FxHashMap;

use super::node::{Edge, Node};
use crate::types::{NodeId, NodeKind};

/// A loaded diagnostic graph.
///
/// # Examples
///
/// ```rust
/// use triagegraph::graph::{Edge, Graph, Node};
/// use triagegraph::types::NodeKind;
///
/// let mut graph = Graph::new("g", "e1");
/// graph.add_node(Node::new("e1", NodeKind::Entry));
/// graph.add_node(Node::new("d1", NodeKind::Decision));
/// graph.add_edge(Edge::new("e1->d1", "e1", "d1", ""));
///
/// assert_eq!(graph.reachable_targets("e1"), vec!["d1".to_string()]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: FxHashMap<NodeId, Node>,
    edges: Vec<Edge>,
    start_node_id: NodeId,
    pub graph_id: String,
    pub name: String,
    pub category: String,
    pub purpose: String,
}

impl Graph {
    pub fn new(graph_id: impl Into<String>, start_node_id: impl Into<NodeId>) -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: Vec::new(),
            start_node_id: start_node_id.into(),
            graph_id: graph_id.into(),
            name: String::new(),
            category: String::new(),
            purpose: String::new(),
        }
    }

    /// Register a node. A node with the same id replaces the previous one.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.node_id.clone(), node);
    }

    /// Register an edge and push it into the source node's adjacency list.
    ///
    /// An edge whose source is unknown is kept in the flat list only; the
    /// loader rejects such descriptions before this can matter.
    pub fn add_edge(&mut self, edge: Edge) {
        if let Some(source) = self.nodes.get_mut(&edge.source) {
            source.add_edge(edge.clone());
        }
        self.edges.push(edge);
    }

    #[must_use]
    pub fn get_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    #[must_use]
    pub fn start_node_id(&self) -> &NodeId {
        &self.start_node_id
    }

    pub fn set_start_node(&mut self, node_id: impl Into<NodeId>) {
        self.start_node_id = node_id.into();
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Target node ids reachable from `node_id` in one hop.
    ///
    /// Unknown ids yield an empty list rather than an error; callers that
    /// need to distinguish use [`get_node`](Self::get_node) first.
    #[must_use]
    pub fn reachable_targets(&self, node_id: &str) -> Vec<NodeId> {
        self.nodes
            .get(node_id)
            .map(Node::reachable_targets)
            .unwrap_or_default()
    }

    /// Non-empty condition labels on the outgoing edges of `node_id`.
    #[must_use]
    pub fn condition_labels(&self, node_id: &str) -> Vec<String> {
        self.nodes
            .get(node_id)
            .map(Node::condition_labels)
            .unwrap_or_default()
    }

    /// All nodes whose `parent_group` is `group_id`, sorted by node id for
    /// deterministic aggregation order.
    #[must_use]
    pub fn children_of(&self, group_id: &str) -> Vec<&Node> {
        let mut children: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.parent_group.as_deref() == Some(group_id))
            .collect();
        children.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        children
    }

    /// The unique entry child of a group, if exactly one exists.
    ///
    /// Returns the number of entry children found on the error side so the
    /// caller can build a precise diagnostic.
    pub fn entry_child_of(&self, group_id: &str) -> Result<&Node, usize> {
        let entries: Vec<&Node> = self
            .children_of(group_id)
            .into_iter()
            .filter(|n| n.kind == NodeKind::Entry)
            .collect();
        match entries.as_slice() {
            [only] => Ok(only),
            other => Err(other.len()),
        }
    }
}
