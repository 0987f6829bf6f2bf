//! Graph validation: run this before persisting or executing a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every connection must reference existing node IDs on both ends.
//! 3. No two connections may match on both endpoints and both handles.
//!
//! Isolated nodes are legal. Cycles are the sorter's concern (see `dag`).

use std::collections::HashSet;

use crate::{
    error::GraphError,
    models::{Connection, Node},
};

/// Validate node identity and connection endpoints.
pub fn validate(nodes: &[Node], connections: &[Connection]) -> Result<(), GraphError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
    }

    let mut seen: HashSet<(&str, &str, &str, &str)> = HashSet::with_capacity(connections.len());
    for connection in connections {
        if !ids.contains(connection.from_node_id.as_str()) {
            return Err(GraphError::UnknownNodeReference {
                node_id: connection.from_node_id.clone(),
                side: "from",
            });
        }
        if !ids.contains(connection.to_node_id.as_str()) {
            return Err(GraphError::UnknownNodeReference {
                node_id: connection.to_node_id.clone(),
                side: "to",
            });
        }
        let key = (
            connection.from_node_id.as_str(),
            connection.to_node_id.as_str(),
            connection.from_output.as_str(),
            connection.to_input.as_str(),
        );
        if !seen.insert(key) {
            return Err(GraphError::DuplicateConnection {
                from: connection.from_node_id.clone(),
                to: connection.to_node_id.clone(),
                from_output: connection.from_output.clone(),
                to_input: connection.to_input.clone(),
            });
        }
    }

    Ok(())
}
