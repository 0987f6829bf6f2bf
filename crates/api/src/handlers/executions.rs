//! Manual trigger and execution read endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::ApiError;
use db::models::ExecutionRow;
use db::repository::{executions as exec_repo, workflows as wf_repo};
use queue::TriggerEvent;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub initial_data: Map<String, Value>,
}

/// `POST /api/v1/workflows/:id/execute`
///
/// The body is optional; without one the run starts from an empty context.
/// A body that is present but not a valid payload is a 400.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payload = parse_payload(&body)?;

    wf_repo::get_workflow(&state.pool, id)
        .await
        .map_err(|e| match e {
            db::DbError::NotFound => ApiError::NotFound(format!("workflow {id} not found")),
            other => other.into(),
        })?;

    let event = TriggerEvent::new(id, payload.initial_data);
    let event_id = event.id.clone();
    state.triggers.send(event).await?;

    info!(workflow_id = %id, event_id = %event_id, "manual trigger accepted");
    Ok((StatusCode::ACCEPTED, Json(json!({ "eventId": event_id }))))
}

fn parse_payload(body: &[u8]) -> Result<ExecuteWorkflowDto, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExecuteWorkflowDto::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// `GET /api/v1/workflows/:id/executions`
pub async fn list(
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExecutionRow>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(Json(exec_repo::list_executions(&state.pool, id, limit).await?))
}

/// `GET /api/v1/executions/:id`
pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionRow>, ApiError> {
    exec_repo::get_execution(&state.pool, id)
        .await
        .map(Json)
        .map_err(|e| match e {
            db::DbError::NotFound => ApiError::NotFound(format!("execution {id} not found")),
            other => other.into(),
        })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};

    use super::*;
    use crate::test_support::{app, post_json, send};
    use crate::WebhookSecrets;

    #[tokio::test]
    async fn execute_enqueues_a_fresh_event() {
        let mut t = app(WebhookSecrets::default()).await;
        let wf = wf_repo::create_workflow(&t.pool, "wf", "user-1").await.unwrap();

        let (status, body) = send(
            &t.router,
            post_json(
                &format!("/api/v1/workflows/{}/execute", wf.id),
                r#"{ "initialData": { "seed": 1 } }"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        let event = t.triggers.recv().await.unwrap();
        assert_eq!(body["eventId"], event.id);
        assert_eq!(event.workflow_id, wf.id);
        assert_eq!(event.initial_data.get("seed"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn execute_without_body_uses_empty_context() {
        let mut t = app(WebhookSecrets::default()).await;
        let wf = wf_repo::create_workflow(&t.pool, "wf", "user-1").await.unwrap();

        let request = Request::post(format!("/api/v1/workflows/{}/execute", wf.id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&t.router, request).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(t.triggers.recv().await.unwrap().initial_data.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let mut t = app(WebhookSecrets::default()).await;
        let wf = wf_repo::create_workflow(&t.pool, "wf", "user-1").await.unwrap();
        let uri = format!("/api/v1/workflows/{}/execute", wf.id);

        let (status, body) = send(&t.router, post_json(&uri, r#"{ "initialData": { "seed": 1 "#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(&t.router, post_json(&uri, r#"{ "initialData": [1, 2] }"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        t.triggers.close();
        assert!(t.triggers.recv().await.is_none());
    }

    #[tokio::test]
    async fn execute_unknown_workflow_is_404() {
        let t = app(WebhookSecrets::default()).await;
        let (status, body) = send(
            &t.router,
            post_json(&format!("/api/v1/workflows/{}/execute", Uuid::new_v4()), "{}"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn executions_are_readable() {
        let t = app(WebhookSecrets::default()).await;
        let wf = wf_repo::create_workflow(&t.pool, "wf", "user-1").await.unwrap();
        let row = exec_repo::create_execution(&t.pool, wf.id, "evt-1").await.unwrap();

        let get = Request::get(format!("/api/v1/executions/{}", row.id)).body(Body::empty()).unwrap();
        let (status, body) = send(&t.router, get).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "RUNNING");
        assert_eq!(body["triggerEventId"], "evt-1");

        let list = Request::get(format!("/api/v1/workflows/{}/executions?limit=5", wf.id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&t.router, list).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn missing_execution_is_404() {
        let t = app(WebhookSecrets::default()).await;
        let get = Request::get(format!("/api/v1/executions/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&t.router, get).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
