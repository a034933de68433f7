//! The traversal state machine.
//!
//! [`advance`] is a pure function from (graph, cursor, optional condition)
//! to the next cursor position. It encodes the node-kind-dependent
//! transition rules, including the two behaviors that make flat decision
//! sequences inside groups work without explicit back-edges:
//!
//! - **enter group**: landing on a group node moves the cursor to that
//!   group's unique entry child, so the group's internal sequence starts
//!   automatically;
//! - **parent climb**: a decision/terminal node whose conclusion matches
//!   no outgoing edge falls through to its owning group's aggregation
//!   step instead of dead-ending.
//!
//! A group with no matching outgoing group edge is a sink: the state
//! machine reports [`Transition::Complete`], the success signal for that
//! branch. The stricter reading (treat it as an error) is available via
//! [`advance_with_mode`].

use miette::Diagnostic;
use thiserror::Error;

use crate::graph::Graph;
use crate::types::{NodeId, NodeKind};

/// Outcome of one transition step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Move the cursor to this node.
    To(NodeId),
    /// The branch reached a terminal group; traversal of this cursor is
    /// complete. Distinct from landing on a node of kind `Terminal`.
    Complete,
}

/// How to treat a group node with no matching outgoing edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupSinkMode {
    /// Report [`Transition::Complete`]. Required for group aggregation to
    /// terminate; the default.
    #[default]
    Complete,
    /// Raise [`TraversalError::NoTransition`] instead.
    Strict,
}

/// Dead ends and structural violations detected while advancing.
///
/// Both variants are fatal to the workflow that hit them and never
/// propagate to sibling branches.
#[derive(Debug, Error, Diagnostic)]
pub enum TraversalError {
    /// The graph violates an invariant the state machine relies on.
    #[error("invalid graph at node {node_id}: {detail}")]
    #[diagnostic(code(triagegraph::traversal::invalid_graph))]
    InvalidGraph { node_id: NodeId, detail: String },

    /// No outgoing edge matches the condition and there is no parent group
    /// to climb to.
    #[error("no transition from node {node_id} for condition {condition:?}")]
    #[diagnostic(
        code(triagegraph::traversal::no_transition),
        help("Add an edge labeled with this conclusion or give the node a parent group.")
    )]
    NoTransition {
        node_id: NodeId,
        condition: Option<String>,
    },
}

impl TraversalError {
    fn invalid(node_id: impl Into<NodeId>, detail: impl Into<String>) -> Self {
        Self::InvalidGraph {
            node_id: node_id.into(),
            detail: detail.into(),
        }
    }
}

/// Compute the next cursor position from `node_id` under `condition`.
///
/// Transition rules, in evaluation order:
///
/// 1. **Entry**: follow its single outgoing edge (anything else is
///    [`TraversalError::InvalidGraph`]); if the target is a group, enter
///    that group's unique entry child.
/// 2. **Decision / Terminal**: exact, case-sensitive match of `condition`
///    against edge labels; on a miss, climb to the parent group if one
///    exists, otherwise [`TraversalError::NoTransition`].
/// 3. **Group**: match `condition` against edges leading to other groups
///    and enter the target group; with no match the group is a sink and
///    the branch completes.
pub fn advance(
    graph: &Graph,
    node_id: &str,
    condition: Option<&str>,
) -> Result<Transition, TraversalError> {
    advance_with_mode(graph, node_id, condition, GroupSinkMode::Complete)
}

/// [`advance`] with an explicit [`GroupSinkMode`].
pub fn advance_with_mode(
    graph: &Graph,
    node_id: &str,
    condition: Option<&str>,
    sink_mode: GroupSinkMode,
) -> Result<Transition, TraversalError> {
    let node = graph
        .get_node(node_id)
        .ok_or_else(|| TraversalError::invalid(node_id, "node does not exist"))?;

    match node.kind {
        NodeKind::Entry => {
            let [edge] = node.edges.as_slice() else {
                return Err(TraversalError::invalid(
                    node_id,
                    format!(
                        "entry node must have exactly one outgoing edge, found {}",
                        node.edges.len()
                    ),
                ));
            };
            let target = graph
                .get_node(&edge.target)
                .ok_or_else(|| TraversalError::invalid(&edge.target, "edge target does not exist"))?;
            if target.kind == NodeKind::Group {
                enter_group(graph, &target.node_id)
            } else {
                Ok(Transition::To(target.node_id.clone()))
            }
        }

        NodeKind::Decision | NodeKind::Terminal => {
            if let Some(condition) = condition
                && let Some(edge) = node.edge_for_condition(condition)
            {
                return Ok(Transition::To(edge.target.clone()));
            }
            if let Some(parent) = &node.parent_group {
                tracing::debug!(
                    node = %node_id,
                    parent = %parent,
                    condition = ?condition,
                    "no edge matched; climbing to parent group"
                );
                return Ok(Transition::To(parent.clone()));
            }
            Err(TraversalError::NoTransition {
                node_id: node_id.to_string(),
                condition: condition.map(str::to_string),
            })
        }

        NodeKind::Group => {
            if let Some(condition) = condition {
                for edge in &node.edges {
                    if edge.condition_value != condition {
                        continue;
                    }
                    let target = graph.get_node(&edge.target).ok_or_else(|| {
                        TraversalError::invalid(&edge.target, "edge target does not exist")
                    })?;
                    if target.kind != NodeKind::Group {
                        return Err(TraversalError::invalid(
                            node_id,
                            format!(
                                "group edge {} targets non-group node {}",
                                edge.edge_id, target.node_id
                            ),
                        ));
                    }
                    return enter_group(graph, &target.node_id);
                }
            }
            match sink_mode {
                GroupSinkMode::Complete => Ok(Transition::Complete),
                GroupSinkMode::Strict => Err(TraversalError::NoTransition {
                    node_id: node_id.to_string(),
                    condition: condition.map(str::to_string),
                }),
            }
        }
    }
}

/// Move the cursor to the unique entry child of `group_id`.
fn enter_group(graph: &Graph, group_id: &str) -> Result<Transition, TraversalError> {
    match graph.entry_child_of(group_id) {
        Ok(entry) => Ok(Transition::To(entry.node_id.clone())),
        Err(count) => Err(TraversalError::invalid(
            group_id,
            format!("group must have exactly one entry child, found {count}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn graph_with_group() -> Graph {
        let mut g = Graph::new("g", "e0");
        g.add_node(Node::new("e0", NodeKind::Entry));
        g.add_node(Node::new("grp", NodeKind::Group));
        g.add_node(Node::new("ge", NodeKind::Entry).with_parent_group("grp"));
        g.add_node(Node::new("d1", NodeKind::Decision).with_parent_group("grp"));
        g.add_node(Node::new("t1", NodeKind::Terminal).with_parent_group("grp"));
        g.add_edge(Edge::new("e0->grp", "e0", "grp", ""));
        g.add_edge(Edge::new("ge->d1", "ge", "d1", ""));
        g.add_edge(Edge::new("d1->t1", "d1", "t1", "yes"));
        g
    }

    #[test]
    fn entry_to_group_enters_entry_child() {
        let g = graph_with_group();
        assert_eq!(
            advance(&g, "e0", None).unwrap(),
            Transition::To("ge".to_string())
        );
    }

    #[test]
    fn entry_follows_single_edge() {
        let g = graph_with_group();
        assert_eq!(
            advance(&g, "ge", None).unwrap(),
            Transition::To("d1".to_string())
        );
    }

    #[test]
    fn entry_with_extra_edges_is_invalid() {
        let mut g = graph_with_group();
        g.add_edge(Edge::new("ge->t1", "ge", "t1", ""));
        assert!(matches!(
            advance(&g, "ge", None),
            Err(TraversalError::InvalidGraph { .. })
        ));
    }

    #[test]
    fn decision_matches_condition_exactly() {
        let g = graph_with_group();
        assert_eq!(
            advance(&g, "d1", Some("yes")).unwrap(),
            Transition::To("t1".to_string())
        );
    }

    #[test]
    fn decision_climbs_to_parent_on_miss() {
        let g = graph_with_group();
        // "no" matches no edge; d1 belongs to grp.
        assert_eq!(
            advance(&g, "d1", Some("no")).unwrap(),
            Transition::To("grp".to_string())
        );
    }

    #[test]
    fn condition_match_is_case_sensitive() {
        let g = graph_with_group();
        assert_eq!(
            advance(&g, "d1", Some("Yes")).unwrap(),
            Transition::To("grp".to_string())
        );
    }

    #[test]
    fn decision_without_parent_dead_ends() {
        let mut g = Graph::new("g", "e0");
        g.add_node(Node::new("d0", NodeKind::Decision));
        let err = advance(&g, "d0", Some("no")).unwrap_err();
        assert!(matches!(err, TraversalError::NoTransition { .. }));
    }

    #[test]
    fn sink_group_completes() {
        let g = graph_with_group();
        assert_eq!(advance(&g, "grp", Some("anything")).unwrap(), Transition::Complete);
        assert_eq!(advance(&g, "grp", None).unwrap(), Transition::Complete);
    }

    #[test]
    fn strict_mode_turns_sink_into_error() {
        let g = graph_with_group();
        let err =
            advance_with_mode(&g, "grp", Some("x"), GroupSinkMode::Strict).unwrap_err();
        assert!(matches!(err, TraversalError::NoTransition { .. }));
    }

    #[test]
    fn group_edge_to_group_enters_target_entry() {
        let mut g = graph_with_group();
        g.add_node(Node::new("grp2", NodeKind::Group));
        g.add_node(Node::new("g2e", NodeKind::Entry).with_parent_group("grp2"));
        g.add_edge(Edge::new("grp->grp2", "grp", "grp2", "escalate"));
        assert_eq!(
            advance(&g, "grp", Some("escalate")).unwrap(),
            Transition::To("g2e".to_string())
        );
    }

    #[test]
    fn group_edge_to_non_group_is_invalid() {
        let mut g = graph_with_group();
        g.add_edge(Edge::new("grp->t1", "grp", "t1", "oops"));
        assert!(matches!(
            advance(&g, "grp", Some("oops")),
            Err(TraversalError::InvalidGraph { .. })
        ));
    }

    #[test]
    fn unknown_node_is_invalid() {
        let g = graph_with_group();
        assert!(matches!(
            advance(&g, "nope", None),
            Err(TraversalError::InvalidGraph { .. })
        ));
    }
}
