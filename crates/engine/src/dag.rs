//! Topological ordering of a workflow graph.
//!
//! Kahn's algorithm over the connection edges. Handles are irrelevant to
//! ordering, parallel connections each count as an edge, and nodes without
//! any edge are scheduled like every other zero in-degree node, so they
//! appear exactly once. Among nodes that are ready at the same time, the one
//! declared first runs first.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::{
    error::GraphError,
    graph,
    models::{Connection, Node},
};

/// Validate the graph and return its nodes in execution order.
///
/// # Errors
/// - [`GraphError::DuplicateNodeId`] if two nodes share an ID.
/// - [`GraphError::DuplicateConnection`] if two connections are identical.
/// - [`GraphError::UnknownNodeReference`] if a connection references a missing node.
/// - [`GraphError::Cycle`] if the graph is not acyclic (a node connected to
///   itself is a cycle).
pub fn topological_sort<'a>(
    nodes: &'a [Node],
    connections: &[Connection],
) -> Result<Vec<&'a Node>, GraphError> {
    // -----------------------------------------------------------------------
    // 1. Structural validation
    // -----------------------------------------------------------------------
    graph::validate(nodes, connections)?;

    // -----------------------------------------------------------------------
    // 2. Adjacency and in-degree, keyed by declaration index
    // -----------------------------------------------------------------------
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];

    for connection in connections {
        // Endpoints were validated above.
        let (Some(&from), Some(&to)) = (
            index.get(connection.from_node_id.as_str()),
            index.get(connection.to_node_id.as_str()),
        ) else {
            continue;
        };
        adjacency[from].push(to);
        in_degree[to] += 1;
    }

    // -----------------------------------------------------------------------
    // 3. Kahn's algorithm with a min-heap on declaration index
    // -----------------------------------------------------------------------
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut sorted: Vec<&Node> = Vec::with_capacity(nodes.len());

    while let Some(Reverse(i)) = ready.pop() {
        sorted.push(&nodes[i]);
        for &next in &adjacency[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    // Anything left with a positive in-degree sits on or behind a cycle.
    if sorted.len() != nodes.len() {
        let stuck = in_degree
            .iter()
            .position(|&d| d > 0)
            .map(|i| nodes[i].id.clone())
            .unwrap_or_default();
        return Err(GraphError::Cycle(stuck));
    }

    Ok(sorted)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::make_node;
    use crate::models::NodeType;

    fn ids(sorted: &[&Node]) -> Vec<String> {
        sorted.iter().map(|n| n.id.clone()).collect()
    }

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| make_node(id, NodeType::HttpRequest)).collect()
    }

    #[test]
    fn linear_graph_in_edge_order() {
        // Declared out of order: C, A, B with A → B → C.
        let n = nodes(&["c", "a", "b"]);
        let edges = vec![Connection::new("a", "b"), Connection::new("b", "c")];
        assert_eq!(ids(&topological_sort(&n, &edges).unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_respects_every_edge() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let n = nodes(&["a", "b", "c", "d"]);
        let edges = vec![
            Connection::new("a", "b"),
            Connection::new("a", "c"),
            Connection::new("b", "d"),
            Connection::new("c", "d"),
        ];
        let sorted = ids(&topological_sort(&n, &edges).unwrap());
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
        for e in &edges {
            let pos = |id: &str| sorted.iter().position(|s| s == id).unwrap();
            assert!(pos(&e.from_node_id) < pos(&e.to_node_id));
        }
    }

    #[test]
    fn independent_nodes_keep_declaration_order() {
        let n = nodes(&["z", "y", "x"]);
        assert_eq!(ids(&topological_sort(&n, &[]).unwrap()), vec!["z", "y", "x"]);
    }

    #[test]
    fn isolated_node_appears_exactly_once() {
        let n = nodes(&["a", "solo", "b"]);
        let sorted = ids(&topological_sort(&n, &[Connection::new("a", "b")]).unwrap());
        assert_eq!(sorted, vec!["a", "solo", "b"]);
    }

    #[test]
    fn parallel_connections_are_not_a_cycle() {
        let n = nodes(&["a", "b"]);
        let mut other_port = Connection::new("a", "b");
        other_port.to_input = "aux".into();
        let edges = vec![Connection::new("a", "b"), other_port];
        assert_eq!(ids(&topological_sort(&n, &edges).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A, plus an unrelated node.
        let n = nodes(&["free", "a", "b", "c"]);
        let edges = vec![
            Connection::new("a", "b"),
            Connection::new("b", "c"),
            Connection::new("c", "a"),
        ];
        assert!(matches!(
            topological_sort(&n, &edges),
            Err(GraphError::Cycle(id)) if id == "a"
        ));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let n = nodes(&["a"]);
        assert!(matches!(
            topological_sort(&n, &[Connection::new("a", "a")]),
            Err(GraphError::Cycle(id)) if id == "a"
        ));
    }

    #[test]
    fn invalid_references_fail_before_sorting() {
        let n = nodes(&["a"]);
        assert!(matches!(
            topological_sort(&n, &[Connection::new("a", "ghost")]),
            Err(GraphError::UnknownNodeReference { .. })
        ));
    }

    #[test]
    fn empty_graph_sorts_to_nothing() {
        assert!(topological_sort(&[], &[]).unwrap().is_empty());
    }
}
