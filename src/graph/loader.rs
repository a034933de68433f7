//! Deserialization of graph descriptions into [`Graph`] values.
//!
//! The authoring front-end exports a flow document: nodes keyed by id with
//! type/question/regex/action/description/position, edges with
//! source/target and a `data.label` condition. This module maps that
//! document onto the engine's model and rejects structurally unsound
//! descriptions before any traversal can start.
//!
//! Layout fields (`position`, `zoom`, `viewport`) are accepted and
//! discarded; they matter to the editor, not to execution.

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use super::model::Graph;
use super::node::{Edge, Node};
use crate::types::{NodeId, NodeKind};

/// Fatal structural defects in a graph description.
///
/// These are raised at load time and never retried; a graph that loads is
/// guaranteed to satisfy the entry/group invariants the state machine
/// relies on.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphStructureError {
    /// The document is not valid JSON or does not match the flow schema.
    #[error("malformed graph description: {source}")]
    #[diagnostic(code(triagegraph::graph::malformed_description))]
    Malformed {
        #[from]
        source: serde_json::Error,
    },

    /// No top-level entry node (type "input" with no parent group).
    #[error("graph {graph_id} has no top-level entry node")]
    #[diagnostic(
        code(triagegraph::graph::missing_entry),
        help("Exactly one node must have type \"input\" and no parentNode.")
    )]
    MissingEntry { graph_id: String },

    /// More than one top-level entry node.
    #[error("graph {graph_id} has {count} top-level entry nodes, expected exactly one")]
    #[diagnostic(code(triagegraph::graph::multiple_entries))]
    MultipleEntries { graph_id: String, count: usize },

    /// A group does not contain exactly one entry child.
    #[error("group {group_id} has {count} entry children, expected exactly one")]
    #[diagnostic(
        code(triagegraph::graph::group_entry_mismatch),
        help("Every group needs exactly one child node of type \"input\".")
    )]
    GroupEntryMismatch { group_id: NodeId, count: usize },

    /// An edge references a node id that does not exist in the description.
    #[error("edge {edge_id} references unknown node {node_id}")]
    #[diagnostic(code(triagegraph::graph::unknown_node))]
    UnknownNode { edge_id: String, node_id: NodeId },
}

#[derive(Debug, Deserialize)]
struct FlowDocument {
    #[serde(default)]
    nodes: Vec<FlowNode>,
    #[serde(default)]
    edges: Vec<FlowEdge>,
}

#[derive(Debug, Deserialize)]
struct FlowNode {
    id: String,
    #[serde(rename = "type")]
    kind: NodeKind,
    #[serde(default)]
    data: FlowNodeData,
    #[serde(rename = "parentNode", default)]
    parent_node: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowNodeData {
    #[serde(default)]
    question: String,
    #[serde(default)]
    regex: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct FlowEdge {
    id: String,
    source: String,
    target: String,
    #[serde(rename = "type", default)]
    edge_type: Option<String>,
    #[serde(default)]
    data: FlowEdgeData,
}

#[derive(Debug, Default, Deserialize)]
struct FlowEdgeData {
    #[serde(default)]
    label: String,
}

/// Metadata attached to a graph from the surrounding catalog entry.
#[derive(Clone, Debug, Default)]
pub struct GraphMeta {
    pub name: String,
    pub category: String,
    pub purpose: String,
}

/// Parse a serialized flow document into a validated [`Graph`].
///
/// # Errors
///
/// Returns [`GraphStructureError`] when the JSON is malformed, the
/// top-level entry is missing or duplicated, a group lacks a unique entry
/// child, or an edge references an unknown node.
pub fn load_graph(
    graph_id: impl Into<String>,
    json: &str,
    meta: GraphMeta,
) -> Result<Graph, GraphStructureError> {
    let graph_id = graph_id.into();
    let document: FlowDocument = serde_json::from_str(json)?;

    let mut graph = Graph::new(graph_id.clone(), String::new());
    graph.name = meta.name;
    graph.category = meta.category;
    graph.purpose = meta.purpose;

    let mut top_level_entries: Vec<NodeId> = Vec::new();
    for flow_node in &document.nodes {
        let node = Node::new(flow_node.id.clone(), flow_node.kind)
            .with_question(flow_node.data.question.clone())
            .with_regex(flow_node.data.regex.clone())
            .with_action(flow_node.data.action.clone())
            .with_description(flow_node.data.description.clone())
            .with_parent_group(flow_node.parent_node.clone().unwrap_or_default());
        if node.kind == NodeKind::Entry && node.parent_group.is_none() {
            top_level_entries.push(node.node_id.clone());
        }
        graph.add_node(node);
    }

    match top_level_entries.as_slice() {
        [] => return Err(GraphStructureError::MissingEntry { graph_id }),
        [start] => graph.set_start_node(start.clone()),
        many => {
            return Err(GraphStructureError::MultipleEntries {
                graph_id,
                count: many.len(),
            });
        }
    }

    for flow_edge in &document.edges {
        for endpoint in [&flow_edge.source, &flow_edge.target] {
            if graph.get_node(endpoint).is_none() {
                return Err(GraphStructureError::UnknownNode {
                    edge_id: flow_edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        let mut edge = Edge::new(
            flow_edge.id.clone(),
            flow_edge.source.clone(),
            flow_edge.target.clone(),
            flow_edge.data.label.clone(),
        );
        if let Some(edge_type) = &flow_edge.edge_type {
            edge.edge_type = edge_type.clone();
        }
        graph.add_edge(edge);
    }

    // Group invariant: exactly one entry child each.
    let group_ids: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.kind == NodeKind::Group)
        .map(|n| n.node_id.clone())
        .collect();
    for group_id in group_ids {
        if let Err(count) = graph.entry_child_of(&group_id) {
            return Err(GraphStructureError::GroupEntryMismatch { group_id, count });
        }
    }

    tracing::debug!(
        graph = %graph.graph_id,
        nodes = graph.node_count(),
        edges = graph.edges().len(),
        start = %graph.start_node_id(),
        "graph description loaded"
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(nodes: &str, edges: &str) -> String {
        format!(r#"{{"nodes": [{nodes}], "edges": [{edges}]}}"#)
    }

    #[test]
    fn loads_minimal_graph() {
        let json = doc(
            r#"{"id": "e1", "type": "input", "data": {}},
               {"id": "d1", "type": "default", "data": {"question": "q", "action": "a"}}"#,
            r#"{"id": "e1->d1", "source": "e1", "target": "d1", "data": {"label": ""}}"#,
        );
        let graph = load_graph("g", &json, GraphMeta::default()).unwrap();
        assert_eq!(graph.start_node_id(), "e1");
        assert_eq!(graph.get_node("d1").unwrap().action, "a");
    }

    #[test]
    fn rejects_missing_entry() {
        let json = doc(r#"{"id": "d1", "type": "default", "data": {}}"#, "");
        let err = load_graph("g", &json, GraphMeta::default()).unwrap_err();
        assert!(matches!(err, GraphStructureError::MissingEntry { .. }));
    }

    #[test]
    fn rejects_multiple_top_level_entries() {
        let json = doc(
            r#"{"id": "e1", "type": "input", "data": {}},
               {"id": "e2", "type": "input", "data": {}}"#,
            "",
        );
        let err = load_graph("g", &json, GraphMeta::default()).unwrap_err();
        assert!(matches!(
            err,
            GraphStructureError::MultipleEntries { count: 2, .. }
        ));
    }

    #[test]
    fn entry_inside_group_is_not_top_level() {
        let json = doc(
            r#"{"id": "e1", "type": "input", "data": {}},
               {"id": "grp", "type": "group", "data": {}},
               {"id": "ge", "type": "input", "data": {}, "parentNode": "grp"}"#,
            "",
        );
        let graph = load_graph("g", &json, GraphMeta::default()).unwrap();
        assert_eq!(graph.start_node_id(), "e1");
    }

    #[test]
    fn rejects_group_without_entry_child() {
        let json = doc(
            r#"{"id": "e1", "type": "input", "data": {}},
               {"id": "grp", "type": "group", "data": {}},
               {"id": "gd", "type": "default", "data": {}, "parentNode": "grp"}"#,
            "",
        );
        let err = load_graph("g", &json, GraphMeta::default()).unwrap_err();
        assert!(matches!(
            err,
            GraphStructureError::GroupEntryMismatch { count: 0, .. }
        ));
    }

    #[test]
    fn rejects_edge_to_unknown_node() {
        let json = doc(
            r#"{"id": "e1", "type": "input", "data": {}}"#,
            r#"{"id": "e1->x", "source": "e1", "target": "x", "data": {}}"#,
        );
        let err = load_graph("g", &json, GraphMeta::default()).unwrap_err();
        assert!(matches!(err, GraphStructureError::UnknownNode { .. }));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = load_graph("g", "{not json", GraphMeta::default()).unwrap_err();
        assert!(matches!(err, GraphStructureError::Malformed { .. }));
    }
}
