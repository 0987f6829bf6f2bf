//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate. Ids and JSON columns are stored
//! as TEXT and decoded here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::DbError;

fn parse_uuid(column: &'static str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::corrupt(column, e))
}

fn parse_json(column: &'static str, raw: &str) -> Result<serde_json::Value, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(column, e))
}

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Owning user; executors look up user-scoped credentials with it.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let id: String = row.try_get("id")?;
        Ok(Self {
            id: parse_uuid("workflows.id", &id)?,
            name: row.try_get("name")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A persisted node row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRow {
    pub workflow_id: Uuid,
    pub id: String,
    pub name: String,
    /// Type tag as stored, e.g. `HTTP_REQUEST`.
    pub node_type: String,
    pub position_x: f64,
    pub position_y: f64,
    pub data: serde_json::Value,
    /// Declaration order within the workflow.
    pub position: i64,
}

impl NodeRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let workflow_id: String = row.try_get("workflow_id")?;
        let data: String = row.try_get("data")?;
        Ok(Self {
            workflow_id: parse_uuid("nodes.workflow_id", &workflow_id)?,
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            node_type: row.try_get("node_type")?,
            position_x: row.try_get("position_x")?,
            position_y: row.try_get("position_y")?,
            data: parse_json("nodes.data", &data)?,
            position: row.try_get("position")?,
        })
    }
}

/// A persisted connection (edge) row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub from_node_id: String,
    pub to_node_id: String,
    pub from_output: String,
    pub to_input: String,
}

impl ConnectionRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let id: String = row.try_get("id")?;
        let workflow_id: String = row.try_get("workflow_id")?;
        Ok(Self {
            id: parse_uuid("connections.id", &id)?,
            workflow_id: parse_uuid("connections.workflow_id", &workflow_id)?,
            from_node_id: row.try_get("from_node_id")?,
            to_node_id: row.try_get("to_node_id")?,
            from_output: row.try_get("from_output")?,
            to_input: row.try_get("to_input")?,
        })
    }
}

/// Node to insert when saving a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub position_x: f64,
    pub position_y: f64,
    pub data: serde_json::Value,
}

/// Connection to insert when saving a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnection {
    pub from_node_id: String,
    pub to_node_id: String,
    pub from_output: String,
    pub to_input: String,
}

/// A workflow header with its full graph, nodes in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub workflow: WorkflowRow,
    pub nodes: Vec<NodeRow>,
    pub connections: Vec<ConnectionRow>,
}

// ---------------------------------------------------------------------------
// executions
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED"  => Ok(Self::Failed),
            other     => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted workflow execution row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Idempotency key of the trigger event that started this run.
    pub trigger_event_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_stack: Option<String>,
}

impl ExecutionRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let id: String = row.try_get("id")?;
        let workflow_id: String = row.try_get("workflow_id")?;
        let status: String = row.try_get("status")?;
        let output: Option<String> = row.try_get("output")?;
        Ok(Self {
            id: parse_uuid("executions.id", &id)?,
            workflow_id: parse_uuid("executions.workflow_id", &workflow_id)?,
            trigger_event_id: row.try_get("trigger_event_id")?,
            status: status
                .parse()
                .map_err(|e: String| DbError::corrupt("executions.status", e))?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            output: output
                .as_deref()
                .map(|raw| parse_json("executions.output", raw))
                .transpose()?,
            error: row.try_get("error")?,
            error_stack: row.try_get("error_stack")?,
        })
    }
}

// ---------------------------------------------------------------------------
// credentials
// ---------------------------------------------------------------------------

/// Provider a stored credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    #[serde(rename = "OPENAI")]
    OpenAi,
    Anthropic,
    Gemini,
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi    => write!(f, "OPENAI"),
            Self::Anthropic => write!(f, "ANTHROPIC"),
            Self::Gemini    => write!(f, "GEMINI"),
        }
    }
}

impl std::str::FromStr for CredentialType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENAI"    => Ok(Self::OpenAi),
            "ANTHROPIC" => Ok(Self::Anthropic),
            "GEMINI"    => Ok(Self::Gemini),
            other       => Err(format!("unknown credential type: {other}")),
        }
    }
}

/// A persisted credential row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub credential_type: CredentialType,
    /// AES-256-GCM encrypted value (base64-encoded nonce + ciphertext).
    #[serde(skip_serializing)]
    pub encrypted_value: String,
    pub created_at: DateTime<Utc>,
}

impl CredentialRow {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, DbError> {
        let id: String = row.try_get("id")?;
        let credential_type: String = row.try_get("credential_type")?;
        Ok(Self {
            id: parse_uuid("credentials.id", &id)?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            credential_type: credential_type
                .parse()
                .map_err(|e: String| DbError::corrupt("credentials.credential_type", e))?,
            encrypted_value: row.try_get("encrypted_value")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
