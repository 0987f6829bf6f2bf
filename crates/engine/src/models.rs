//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They are built from the `db` row structs and can be serialised
//! to/from a workflow definition file (`nodeflow import`).

use std::fmt;
use std::str::FromStr;

use db::models::{NewConnection, NewNode, WorkflowGraph};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

/// Handle used when a connection does not name its ports.
pub const DEFAULT_HANDLE: &str = "main";

// ---------------------------------------------------------------------------
// NodeType
// ---------------------------------------------------------------------------

/// Closed set of node types the engine can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Initial,
    ManualTrigger,
    GoogleFormTrigger,
    StripeTrigger,
    HttpRequest,
    #[serde(rename = "OPENAI")]
    OpenAi,
    Anthropic,
    Gemini,
    Discord,
    Slack,
}

impl NodeType {
    pub const ALL: [NodeType; 10] = [
        Self::Initial,
        Self::ManualTrigger,
        Self::GoogleFormTrigger,
        Self::StripeTrigger,
        Self::HttpRequest,
        Self::OpenAi,
        Self::Anthropic,
        Self::Gemini,
        Self::Discord,
        Self::Slack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial           => "INITIAL",
            Self::ManualTrigger     => "MANUAL_TRIGGER",
            Self::GoogleFormTrigger => "GOOGLE_FORM_TRIGGER",
            Self::StripeTrigger     => "STRIPE_TRIGGER",
            Self::HttpRequest       => "HTTP_REQUEST",
            Self::OpenAi            => "OPENAI",
            Self::Anthropic         => "ANTHROPIC",
            Self::Gemini            => "GEMINI",
            Self::Discord           => "DISCORD",
            Self::Slack             => "SLACK",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::UnknownNodeType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Editor canvas position. Ignored by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Caller-assigned id, unique within the workflow.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub position: Position,
    /// Type-specific configuration, passed verbatim to the executor.
    #[serde(default)]
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

fn default_handle() -> String {
    DEFAULT_HANDLE.to_owned()
}

/// Directed edge from one node's output handle to another's input handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default = "default_handle")]
    pub from_output: String,
    #[serde(default = "default_handle")]
    pub to_input: String,
}

impl Connection {
    /// Edge between the implicit `main` ports.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node_id: from.into(),
            to_node_id: to.into(),
            from_output: default_handle(),
            to_input: default_handle(),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow graph; nodes are in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    /// Owner; scopes credential lookups during a run.
    pub user_id: String,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl TryFrom<WorkflowGraph> for Workflow {
    type Error = EngineError;

    fn try_from(graph: WorkflowGraph) -> Result<Self, Self::Error> {
        let nodes = graph
            .nodes
            .into_iter()
            .map(|row| {
                Ok(Node {
                    node_type: row.node_type.parse()?,
                    id: row.id,
                    name: row.name,
                    position: Position {
                        x: row.position_x,
                        y: row.position_y,
                    },
                    data: row.data,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let connections = graph
            .connections
            .into_iter()
            .map(|row| Connection {
                from_node_id: row.from_node_id,
                to_node_id: row.to_node_id,
                from_output: row.from_output,
                to_input: row.to_input,
            })
            .collect();

        Ok(Self {
            id: graph.workflow.id,
            name: graph.workflow.name,
            user_id: graph.workflow.user_id,
            nodes,
            connections,
        })
    }
}

/// Workflow file format accepted by `nodeflow validate` and `nodeflow import`.
///
/// The INITIAL node is optional: a definition may declare one so its
/// connections can start from it, otherwise import creates it. More than
/// one INITIAL node is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl WorkflowDefinition {
    /// Row inserts for the `db::repository::workflows` graph writers.
    pub fn to_rows(&self) -> (Vec<NewNode>, Vec<NewConnection>) {
        let nodes = self
            .nodes
            .iter()
            .map(|n| NewNode {
                id: n.id.clone(),
                name: n.name.clone(),
                node_type: n.node_type.to_string(),
                position_x: n.position.x,
                position_y: n.position.y,
                data: n.data.clone(),
            })
            .collect();
        let connections = self
            .connections
            .iter()
            .map(|c| NewConnection {
                from_node_id: c.from_node_id.clone(),
                to_node_id: c.to_node_id.clone(),
                from_output: c.from_output.clone(),
                to_input: c.to_input.clone(),
            })
            .collect();
        (nodes, connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_type_round_trips_through_its_tag() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
        }
        assert!(matches!(
            "WEBHOOK".parse::<NodeType>(),
            Err(EngineError::UnknownNodeType(t)) if t == "WEBHOOK"
        ));
    }

    #[test]
    fn definition_fills_in_defaults() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "ping",
            "nodes": [
                { "id": "t", "type": "MANUAL_TRIGGER" },
                { "id": "h", "type": "HTTP_REQUEST", "data": { "variableName": "ping" } },
            ],
            "connections": [{ "fromNodeId": "t", "toNodeId": "h" }],
        }))
        .unwrap();

        assert_eq!(def.connections[0], Connection::new("t", "h"));
        assert_eq!(def.nodes[0].position, Position::default());
        assert!(def.nodes[0].data.is_null());

        let (nodes, connections) = def.to_rows();
        assert_eq!(nodes[1].node_type, "HTTP_REQUEST");
        assert_eq!(connections[0].from_output, "main");
    }
}
