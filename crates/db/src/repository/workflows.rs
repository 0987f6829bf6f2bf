//! Workflow and graph persistence.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::{
    DbError,
    models::{ConnectionRow, NewConnection, NewNode, NodeRow, WorkflowGraph, WorkflowRow},
};

/// Type tag of the placeholder node every workflow starts with.
pub const INITIAL_NODE_TYPE: &str = "INITIAL";

/// Insert a new workflow owned by `user_id`, together with its INITIAL node.
pub async fn create_workflow(
    pool: &SqlitePool,
    name: &str,
    user_id: &str,
) -> Result<WorkflowRow, DbError> {
    create_workflow_with_graph(pool, name, user_id, &[], &[]).await
}

/// Insert a new workflow and its whole graph in one transaction.
///
/// When `nodes` holds no INITIAL node, a generated one is stored first. On
/// any failure nothing is written.
pub async fn create_workflow_with_graph(
    pool: &SqlitePool,
    name: &str,
    user_id: &str,
    nodes: &[NewNode],
    connections: &[NewConnection],
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let workflow_key = id.to_string();

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        INSERT INTO workflows (id, name, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, name, user_id, created_at, updated_at
        "#,
    )
    .bind(&workflow_key)
    .bind(name)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(DbError::from_write)?;

    let mut all_nodes = Vec::with_capacity(nodes.len() + 1);
    if !nodes.iter().any(|n| n.node_type == INITIAL_NODE_TYPE) {
        all_nodes.push(NewNode {
            id: Uuid::new_v4().to_string(),
            name: INITIAL_NODE_TYPE.to_owned(),
            node_type: INITIAL_NODE_TYPE.to_owned(),
            position_x: 0.0,
            position_y: 0.0,
            data: serde_json::json!({}),
        });
    }
    all_nodes.extend_from_slice(nodes);

    insert_graph(&mut tx, &workflow_key, &all_nodes, connections).await?;
    tx.commit().await?;

    WorkflowRow::from_row(&row)
}

/// Replace a workflow's nodes and connections in one transaction.
///
/// Nodes keep the order of `nodes` as their declaration order.
pub async fn save_graph(
    pool: &SqlitePool,
    workflow_id: Uuid,
    nodes: &[NewNode],
    connections: &[NewConnection],
) -> Result<(), DbError> {
    let workflow_key = workflow_id.to_string();
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE workflows SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(&workflow_key)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    sqlx::query("DELETE FROM connections WHERE workflow_id = ?")
        .bind(&workflow_key)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM nodes WHERE workflow_id = ?")
        .bind(&workflow_key)
        .execute(&mut *tx)
        .await?;

    insert_graph(&mut tx, &workflow_key, nodes, connections).await?;
    tx.commit().await?;
    Ok(())
}

async fn insert_graph(
    tx: &mut Transaction<'_, Sqlite>,
    workflow_key: &str,
    nodes: &[NewNode],
    connections: &[NewConnection],
) -> Result<(), DbError> {
    for (position, node) in nodes.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO nodes
                (workflow_id, id, name, node_type, position_x, position_y, data, position)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(workflow_key)
        .bind(&node.id)
        .bind(&node.name)
        .bind(&node.node_type)
        .bind(node.position_x)
        .bind(node.position_y)
        .bind(node.data.to_string())
        .bind(position as i64)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from_write)?;
    }

    for connection in connections {
        sqlx::query(
            r#"
            INSERT INTO connections
                (id, workflow_id, from_node_id, to_node_id, from_output, to_input)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(workflow_key)
        .bind(&connection.from_node_id)
        .bind(&connection.to_node_id)
        .bind(&connection.from_output)
        .bind(&connection.to_input)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from_write)?;
    }

    Ok(())
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &SqlitePool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query(
        r#"SELECT id, name, user_id, created_at, updated_at FROM workflows WHERE id = ?"#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    WorkflowRow::from_row(&row)
}

/// Owning user of a workflow.
pub async fn get_workflow_owner(pool: &SqlitePool, id: Uuid) -> Result<String, DbError> {
    let owner: Option<(String,)> = sqlx::query_as("SELECT user_id FROM workflows WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    owner.map(|(user_id,)| user_id).ok_or(DbError::NotFound)
}

/// Load a workflow's current nodes (declaration order) and connections.
pub async fn get_workflow_graph(pool: &SqlitePool, id: Uuid) -> Result<WorkflowGraph, DbError> {
    let workflow = get_workflow(pool, id).await?;

    let nodes = sqlx::query(
        r#"
        SELECT workflow_id, id, name, node_type, position_x, position_y, data, position
        FROM nodes
        WHERE workflow_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?
    .iter()
    .map(NodeRow::from_row)
    .collect::<Result<Vec<_>, _>>()?;

    let connections = sqlx::query(
        r#"
        SELECT id, workflow_id, from_node_id, to_node_id, from_output, to_input
        FROM connections
        WHERE workflow_id = ?
        ORDER BY rowid ASC
        "#,
    )
    .bind(id.to_string())
    .fetch_all(pool)
    .await?
    .iter()
    .map(ConnectionRow::from_row)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(WorkflowGraph {
        workflow,
        nodes,
        connections,
    })
}

/// Return all workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &SqlitePool) -> Result<Vec<WorkflowRow>, DbError> {
    sqlx::query(
        r#"SELECT id, name, user_id, created_at, updated_at FROM workflows ORDER BY created_at DESC"#,
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(WorkflowRow::from_row)
    .collect()
}

/// Permanently delete a workflow by its primary key. Nodes, connections and
/// executions cascade.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &SqlitePool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;
    use serde_json::json;

    fn node(id: &str, node_type: &str) -> NewNode {
        NewNode {
            id: id.into(),
            name: id.into(),
            node_type: node_type.into(),
            position_x: 0.0,
            position_y: 0.0,
            data: json!({ "label": id }),
        }
    }

    fn edge(from: &str, to: &str) -> NewConnection {
        NewConnection {
            from_node_id: from.into(),
            to_node_id: to.into(),
            from_output: "main".into(),
            to_input: "main".into(),
        }
    }

    #[tokio::test]
    async fn new_workflow_has_exactly_one_initial_node() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow(&pool, "demo", "user-1").await.unwrap();

        let graph = get_workflow_graph(&pool, wf.id).await.unwrap();
        assert_eq!(graph.workflow.user_id, "user-1");
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].node_type, INITIAL_NODE_TYPE);
        assert!(graph.connections.is_empty());
    }

    #[tokio::test]
    async fn save_graph_replaces_nodes_in_declaration_order() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow(&pool, "demo", "user-1").await.unwrap();

        save_graph(
            &pool,
            wf.id,
            &[node("c", "HTTP_REQUEST"), node("a", "INITIAL"), node("b", "MANUAL_TRIGGER")],
            &[edge("a", "b"), edge("b", "c")],
        )
        .await
        .unwrap();

        let graph = get_workflow_graph(&pool, wf.id).await.unwrap();
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(graph.nodes[0].data, json!({ "label": "c" }));
        assert_eq!(graph.connections.len(), 2);
        assert_eq!(graph.connections[0].from_node_id, "a");
    }

    #[tokio::test]
    async fn save_graph_for_missing_workflow_is_not_found() {
        let pool = create_memory_pool().await.unwrap();
        let err = save_graph(&pool, Uuid::new_v4(), &[], &[]).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn graph_is_created_with_its_workflow() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow_with_graph(
            &pool,
            "demo",
            "user-1",
            &[node("t", "MANUAL_TRIGGER"), node("h", "HTTP_REQUEST")],
            &[edge("t", "h")],
        )
        .await
        .unwrap();

        let graph = get_workflow_graph(&pool, wf.id).await.unwrap();
        let types: Vec<&str> = graph.nodes.iter().map(|n| n.node_type.as_str()).collect();
        assert_eq!(types, vec![INITIAL_NODE_TYPE, "MANUAL_TRIGGER", "HTTP_REQUEST"]);
        assert_eq!(graph.connections.len(), 1);
    }

    #[tokio::test]
    async fn declared_initial_node_is_not_duplicated() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow_with_graph(&pool, "demo", "u", &[node("init", "INITIAL")], &[])
            .await
            .unwrap();

        let graph = get_workflow_graph(&pool, wf.id).await.unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].id, "init");
    }

    #[tokio::test]
    async fn failed_graph_insert_leaves_no_workflow() {
        let pool = create_memory_pool().await.unwrap();
        let err = create_workflow_with_graph(
            &pool,
            "demo",
            "u",
            &[node("a", "MANUAL_TRIGGER"), node("b", "SLACK")],
            &[edge("a", "b"), edge("a", "b")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DbError::Duplicate));
        assert!(list_workflows(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn owner_lookup_and_delete() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow(&pool, "demo", "owner-7").await.unwrap();

        assert_eq!(get_workflow_owner(&pool, wf.id).await.unwrap(), "owner-7");
        assert_eq!(list_workflows(&pool).await.unwrap().len(), 1);

        delete_workflow(&pool, wf.id).await.unwrap();
        assert!(matches!(get_workflow(&pool, wf.id).await, Err(DbError::NotFound)));
        assert!(matches!(delete_workflow(&pool, wf.id).await, Err(DbError::NotFound)));
    }
}
