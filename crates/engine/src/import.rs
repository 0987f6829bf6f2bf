//! Storing workflow definition files.

use db::{repository::workflows, DbPool};
use tracing::info;
use uuid::Uuid;

use crate::{
    dag::topological_sort,
    error::GraphError,
    models::{Node, NodeType, WorkflowDefinition},
    EngineError,
};

/// Check a definition before it is stored and return its execution order.
///
/// At most one INITIAL node is allowed; none means the stored workflow
/// keeps the INITIAL node created with it.
pub fn check_definition(definition: &WorkflowDefinition) -> Result<Vec<&Node>, GraphError> {
    let count = initial_count(definition);
    if count > 1 {
        return Err(GraphError::InitialNodeCount(count));
    }
    topological_sort(&definition.nodes, &definition.connections)
}

fn initial_count(definition: &WorkflowDefinition) -> usize {
    definition
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Initial)
        .count()
}

/// Validate `definition` and store it as a new workflow owned by `user_id`.
///
/// The definition may carry its own INITIAL node (so connections can start
/// from it); otherwise one is generated. The workflow and its graph are
/// written in one transaction, so a rejected import stores nothing.
pub async fn import_workflow(
    pool: &DbPool,
    definition: &WorkflowDefinition,
    user_id: &str,
) -> Result<Uuid, EngineError> {
    check_definition(definition)?;

    let (nodes, connections) = definition.to_rows();
    let workflow =
        workflows::create_workflow_with_graph(pool, &definition.name, user_id, &nodes, &connections)
            .await?;

    info!(workflow_id = %workflow.id, nodes = nodes.len(), "workflow imported");
    Ok(workflow.id)
}
