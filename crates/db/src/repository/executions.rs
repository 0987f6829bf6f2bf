//! Execution repository functions.
//!
//! An execution row is written at most twice: once at creation (`RUNNING`)
//! and once when the run reaches a terminal status.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionRow, ExecutionStatus},
};

const EXECUTION_COLUMNS: &str = "id, workflow_id, trigger_event_id, status, started_at, \
     completed_at, output, error, error_stack";

/// Create a new execution in `RUNNING` status for a trigger event.
///
/// Returns [`DbError::Duplicate`] when the `(trigger_event_id, workflow_id)`
/// pair was already recorded, and [`DbError::NotFound`] when the workflow
/// does not exist.
pub async fn create_execution(
    pool: &SqlitePool,
    workflow_id: Uuid,
    trigger_event_id: &str,
) -> Result<ExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO executions (id, workflow_id, trigger_event_id, status, started_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING {EXECUTION_COLUMNS}
        "#
    ))
    .bind(id.to_string())
    .bind(workflow_id.to_string())
    .bind(trigger_event_id)
    .bind(ExecutionStatus::Running.to_string())
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(DbError::from_write)?;

    ExecutionRow::from_row(&row)
}

/// Mark a running execution as succeeded with its final context.
pub async fn mark_succeeded(
    pool: &SqlitePool,
    execution_id: Uuid,
    output: &serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET status = ?, completed_at = ?, output = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(ExecutionStatus::Success.to_string())
    .bind(Utc::now())
    .bind(output.to_string())
    .bind(execution_id.to_string())
    .bind(ExecutionStatus::Running.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Mark a running execution as failed.
pub async fn mark_failed(
    pool: &SqlitePool,
    execution_id: Uuid,
    error: &str,
    error_stack: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET status = ?, completed_at = ?, error = ?, error_stack = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(ExecutionStatus::Failed.to_string())
    .bind(Utc::now())
    .bind(error)
    .bind(error_stack)
    .bind(execution_id.to_string())
    .bind(ExecutionStatus::Running.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &SqlitePool, id: Uuid) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    ExecutionRow::from_row(&row)
}

/// Fetch the execution recorded for a trigger event.
pub async fn find_by_trigger(
    pool: &SqlitePool,
    workflow_id: Uuid,
    trigger_event_id: &str,
) -> Result<ExecutionRow, DbError> {
    let row = sqlx::query(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE workflow_id = ? AND trigger_event_id = ?"
    ))
    .bind(workflow_id.to_string())
    .bind(trigger_event_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    ExecutionRow::from_row(&row)
}

/// Executions of one workflow, newest first.
pub async fn list_executions(
    pool: &SqlitePool,
    workflow_id: Uuid,
    limit: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    sqlx::query(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE workflow_id = ? \
         ORDER BY started_at DESC LIMIT ?"
    ))
    .bind(workflow_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?
    .iter()
    .map(ExecutionRow::from_row)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;
    use crate::repository::workflows::create_workflow;
    use serde_json::json;

    #[tokio::test]
    async fn duplicate_trigger_event_is_rejected() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow(&pool, "demo", "u").await.unwrap();

        let first = create_execution(&pool, wf.id, "evt-1").await.unwrap();
        assert_eq!(first.status, ExecutionStatus::Running);

        let err = create_execution(&pool, wf.id, "evt-1").await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate));

        let found = find_by_trigger(&pool, wf.id, "evt-1").await.unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(list_executions(&pool, wf.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_event_id_on_another_workflow_is_allowed() {
        let pool = create_memory_pool().await.unwrap();
        let a = create_workflow(&pool, "a", "u").await.unwrap();
        let b = create_workflow(&pool, "b", "u").await.unwrap();

        create_execution(&pool, a.id, "evt").await.unwrap();
        create_execution(&pool, b.id, "evt").await.unwrap();
    }

    #[tokio::test]
    async fn execution_for_unknown_workflow_is_not_found() {
        let pool = create_memory_pool().await.unwrap();
        let err = create_execution(&pool, Uuid::new_v4(), "evt").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn terminal_update_is_written_once() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow(&pool, "demo", "u").await.unwrap();
        let exec = create_execution(&pool, wf.id, "evt").await.unwrap();

        mark_succeeded(&pool, exec.id, &json!({ "ping": { "status": 200 } }))
            .await
            .unwrap();

        let stored = get_execution(&pool, exec.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.output.unwrap()["ping"]["status"], 200);

        let err = mark_failed(&pool, exec.id, "late", None).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
        assert_eq!(
            get_execution(&pool, exec.id).await.unwrap().status,
            ExecutionStatus::Success
        );
    }

    #[tokio::test]
    async fn failure_records_error_and_stack() {
        let pool = create_memory_pool().await.unwrap();
        let wf = create_workflow(&pool, "demo", "u").await.unwrap();
        let exec = create_execution(&pool, wf.id, "evt").await.unwrap();

        mark_failed(&pool, exec.id, "boom", Some("boom\ncaused by: io"))
            .await
            .unwrap();

        let stored = get_execution(&pool, exec.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert_eq!(stored.error_stack.as_deref(), Some("boom\ncaused by: io"));
        assert!(stored.output.is_none());
    }
}
