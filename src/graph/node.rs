//! Node and edge data structures for diagnostic graphs.
//!
//! A [`Node`] owns its outgoing [`Edge`] list exclusively; the graph keeps
//! a second, flat edge list for serialization but the adjacency consulted
//! during traversal lives here. Both types are immutable after load —
//! per-node execution state (conclusion, status, timing) is tracked
//! separately in [`crate::state::NodeAnnotations`].

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, NodeKind};

/// A directed, optionally labeled connection between two nodes.
///
/// The `condition_value` is the label matched against a node's conclusion
/// during transition; an empty label never participates in condition
/// matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
    pub condition_value: String,
}

impl Edge {
    pub fn new(
        edge_id: impl Into<String>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        condition_value: impl Into<String>,
    ) -> Self {
        Self {
            edge_id: edge_id.into(),
            source: source.into(),
            target: target.into(),
            edge_type: "default".to_string(),
            condition_value: condition_value.into(),
        }
    }

    /// Returns `true` if this edge carries a non-empty condition label.
    #[must_use]
    pub fn has_condition(&self) -> bool {
        !self.condition_value.is_empty()
    }
}

/// One decision point in a diagnostic graph.
///
/// # Fields
///
/// - `question`: prompt fragment posed to the oracle when extracting a
///   conclusion from this node's observation
/// - `regex`: optional extraction pattern; when present it replaces the
///   oracle-based extraction entirely
/// - `action`: opaque command string run by the external action executor
///   (empty for entry and group nodes)
/// - `description`: human-readable failure/purpose text
/// - `parent_group`: the group this node belongs to, by id only — never a
///   live reference
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub question: String,
    pub regex: Option<String>,
    pub action: String,
    pub description: String,
    pub parent_group: Option<NodeId>,
    /// Outgoing edges, owned exclusively by this node.
    pub edges: Vec<Edge>,
}

impl Node {
    pub fn new(node_id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            question: String::new(),
            regex: None,
            action: String::new(),
            description: String::new(),
            parent_group: None,
            edges: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    #[must_use]
    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        let regex = regex.into();
        self.regex = if regex.is_empty() { None } else { Some(regex) };
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_parent_group(mut self, parent: impl Into<NodeId>) -> Self {
        let parent = parent.into();
        self.parent_group = if parent.is_empty() {
            None
        } else {
            Some(parent)
        };
        self
    }

    /// Append an outgoing edge to this node's adjacency list.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Target node ids of all outgoing edges, in insertion order.
    #[must_use]
    pub fn reachable_targets(&self) -> Vec<NodeId> {
        self.edges.iter().map(|e| e.target.clone()).collect()
    }

    /// Non-empty condition labels of all outgoing edges, in insertion order.
    ///
    /// These are the permissible conclusions the extraction stage matches
    /// against when this node has no regex.
    #[must_use]
    pub fn condition_labels(&self) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.has_condition())
            .map(|e| e.condition_value.clone())
            .collect()
    }

    /// Find the outgoing edge whose label equals `condition` exactly.
    #[must_use]
    pub fn edge_for_condition(&self, condition: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.condition_value == condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node() -> Node {
        let mut node = Node::new("d1", NodeKind::Decision)
            .with_question("is the container ready?")
            .with_action("inspect readiness");
        node.add_edge(Edge::new("e1", "d1", "d2", "yes"));
        node.add_edge(Edge::new("e2", "d1", "t1", "no"));
        node.add_edge(Edge::new("e3", "d1", "t2", ""));
        node
    }

    #[test]
    fn condition_labels_skip_empty() {
        let node = sample_node();
        assert_eq!(node.condition_labels(), vec!["yes", "no"]);
    }

    #[test]
    fn reachable_targets_preserve_order() {
        let node = sample_node();
        assert_eq!(node.reachable_targets(), vec!["d2", "t1", "t2"]);
    }

    #[test]
    fn edge_for_condition_is_exact_and_case_sensitive() {
        let node = sample_node();
        assert_eq!(node.edge_for_condition("yes").unwrap().target, "d2");
        assert!(node.edge_for_condition("Yes").is_none());
    }

    #[test]
    fn builder_normalizes_empty_optionals() {
        let node = Node::new("x", NodeKind::Decision)
            .with_regex("")
            .with_parent_group("");
        assert!(node.regex.is_none());
        assert!(node.parent_group.is_none());
    }
}
