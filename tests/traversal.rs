//! Traversal properties over programmatically built graphs.

use proptest::prelude::*;

use triagegraph::graph::{Edge, Graph, Node};
use triagegraph::traversal::{Transition, TraversalError, advance};
use triagegraph::types::NodeKind;

/// Linear chain: entry -> d0 -> d1 -> ... -> d(n-1), every hop labeled
/// "go", last decision has no outgoing edge and no parent.
fn chain(length: usize) -> Graph {
    let mut graph = Graph::new("chain", "entry");
    graph.add_node(Node::new("entry", NodeKind::Entry));
    for i in 0..length {
        graph.add_node(Node::new(format!("d{i}"), NodeKind::Decision));
    }
    graph.add_edge(Edge::new("entry->d0", "entry", "d0", ""));
    for i in 1..length {
        graph.add_edge(Edge::new(
            format!("d{}->d{i}", i - 1),
            format!("d{}", i - 1),
            format!("d{i}"),
            "go",
        ));
    }
    graph
}

#[test]
fn parent_climb_fallback_beats_dead_end() {
    let mut graph = Graph::new("g", "e");
    graph.add_node(Node::new("g1", NodeKind::Group));
    graph.add_node(Node::new("ge", NodeKind::Entry).with_parent_group("g1"));
    graph.add_node(Node::new("d1", NodeKind::Decision).with_parent_group("g1"));
    graph.add_node(Node::new("n2", NodeKind::Decision).with_parent_group("g1"));
    graph.add_edge(Edge::new("d1->n2", "d1", "n2", "yes"));

    // Conclusion "no" matches nothing; the cursor climbs to g1 instead of
    // erroring.
    assert_eq!(
        advance(&graph, "d1", Some("no")).unwrap(),
        Transition::To("g1".to_string())
    );
}

#[test]
fn sink_group_completes_instead_of_raising() {
    let mut graph = Graph::new("g", "e");
    graph.add_node(Node::new("g1", NodeKind::Group));
    graph.add_node(Node::new("ge", NodeKind::Entry).with_parent_group("g1"));
    graph.add_node(Node::new("d1", NodeKind::Decision).with_parent_group("g1"));
    graph.add_node(Node::new("o1", NodeKind::Terminal).with_parent_group("g1"));

    assert_eq!(advance(&graph, "g1", Some("anything")).unwrap(), Transition::Complete);
}

#[test]
fn chain_walk_terminates_at_dead_end() {
    let graph = chain(5);
    let mut cursor = "entry".to_string();
    let mut steps = 0;
    loop {
        match advance(&graph, &cursor, Some("go")) {
            Ok(Transition::To(next)) => {
                cursor = next;
                steps += 1;
            }
            Ok(Transition::Complete) => break,
            Err(TraversalError::NoTransition { node_id, .. }) => {
                assert_eq!(node_id, "d4");
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(steps <= graph.node_count(), "walk exceeded node count");
    }
    assert_eq!(steps, 5);
}

proptest! {
    /// From the entry of any well-formed chain, the walk terminates in at
    /// most |nodes| transitions and never revisits a node.
    #[test]
    fn chain_walk_is_bounded(length in 1usize..24) {
        let graph = chain(length);
        let mut cursor = "entry".to_string();
        let mut visited = vec![cursor.clone()];
        loop {
            match advance(&graph, &cursor, Some("go")) {
                Ok(Transition::To(next)) => {
                    prop_assert!(!visited.contains(&next), "revisited {next}");
                    visited.push(next.clone());
                    cursor = next;
                }
                Ok(Transition::Complete) => break,
                Err(TraversalError::NoTransition { .. }) => break,
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
            prop_assert!(visited.len() <= graph.node_count());
        }
        prop_assert_eq!(visited.len(), graph.node_count());
    }

    /// Nested groups: entering a group chain lands on each group's entry
    /// child, and the innermost group completes.
    #[test]
    fn group_chain_enters_and_completes(depth in 1usize..8) {
        let mut graph = Graph::new("nested", "entry");
        graph.add_node(Node::new("entry", NodeKind::Entry));
        for i in 0..depth {
            graph.add_node(Node::new(format!("grp{i}"), NodeKind::Group));
            graph.add_node(
                Node::new(format!("ge{i}"), NodeKind::Entry).with_parent_group(format!("grp{i}")),
            );
        }
        graph.add_edge(Edge::new("entry->grp0", "entry", "grp0", ""));
        for i in 1..depth {
            graph.add_edge(Edge::new(
                format!("grp{}->grp{i}", i - 1),
                format!("grp{}", i - 1),
                format!("grp{i}"),
                "deeper",
            ));
        }

        // Entry into the first group goes to its entry child.
        prop_assert_eq!(
            advance(&graph, "entry", None).unwrap(),
            Transition::To("ge0".to_string())
        );
        // Each group hands over to the next group's entry child.
        for i in 1..depth {
            prop_assert_eq!(
                advance(&graph, &format!("grp{}", i - 1), Some("deeper")).unwrap(),
                Transition::To(format!("ge{i}"))
            );
        }
        // The innermost group is a sink.
        prop_assert_eq!(
            advance(&graph, &format!("grp{}", depth - 1), Some("deeper")).unwrap(),
            Transition::Complete
        );
    }
}
