//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::NodeType;

/// Structural problems with a workflow graph. Detected before any node runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle through node '{0}'")]
    Cycle(String),

    /// Two connections share both endpoints and both handles.
    #[error("duplicate connection '{from}' -> '{to}' ({from_output} -> {to_input})")]
    DuplicateConnection {
        from: String,
        to: String,
        from_output: String,
        to_input: String,
    },

    /// A workflow definition may declare at most one INITIAL node.
    #[error("workflow has {0} INITIAL nodes, expected at most one")]
    InitialNodeCount(usize),
}

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A stored node carries a type tag the engine does not know.
    #[error("unknown node type: '{0}'")]
    UnknownNodeType(String),

    /// The registry has no executor for a known node type.
    #[error("no executor registered for node type {0}")]
    NoExecutor(NodeType),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    // ------ Execution errors ------

    /// A node failed; the rest of the run is skipped.
    #[error("node '{node_id}' ({node_type}) failed: {source}")]
    NodeFailed {
        node_id: String,
        node_type: NodeType,
        #[source]
        source: nodes::NodeError,
    },

    /// The run was cancelled between two nodes.
    #[error("execution cancelled")]
    Cancelled,

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl EngineError {
    /// The error and its `source()` chain, one cause per line.
    pub fn stack(&self) -> String {
        let mut stack = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::NodeError;

    #[test]
    fn stack_lists_the_cause_chain() {
        let err = EngineError::NodeFailed {
            node_id: "h".into(),
            node_type: NodeType::HttpRequest,
            source: NodeError::permanent("HTTP request node: request failed with status 404 Not Found"),
        };
        assert_eq!(
            err.stack(),
            "node 'h' (HTTP_REQUEST) failed: HTTP request node: request failed with status 404 Not Found\n\
             caused by: HTTP request node: request failed with status 404 Not Found"
        );
    }

    #[test]
    fn graph_errors_display_transparently() {
        let err = EngineError::from(GraphError::Cycle("a".into()));
        assert_eq!(err.to_string(), "workflow graph contains a cycle through node 'a'");
        assert_eq!(err.stack(), err.to_string());
    }
}
