//! Inbound webhooks from Google Forms (Apps Script) and Stripe.
//!
//! Both routes take the target workflow from the `workflowId` query
//! parameter, check an optional shared secret, reshape the payload into the
//! run's initial data and enqueue a trigger event. The event id is derived
//! from the upstream id when there is one, so a redelivered webhook maps
//! onto the execution that already exists.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::ApiError;
use db::repository::workflows as wf_repo;
use queue::TriggerEvent;

pub const GOOGLE_SECRET_HEADER: &str = "x-google-webhook-secret";
pub const STRIPE_SECRET_HEADER: &str = "stripe-signature";

type Params = HashMap<String, String>;

/// `POST /api/v1/webhooks/google-form?workflowId=…`
pub async fn google_form(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let secret = state.secrets.google_form.as_deref();
    let workflow_id = accept(&state, &params, &headers, secret, GOOGLE_SECRET_HEADER).await?;
    let body = parse_body(&body)?;

    let mut form = pick(
        &body,
        &[
            ("formId", "formId"),
            ("formTitle", "formTitle"),
            ("responseId", "responseId"),
            ("timestamp", "timestamp"),
            ("responses", "responses"),
            ("respondentEmail", "respondentEmail"),
        ],
    );
    form.insert("raw".into(), body.clone());

    let event_id = upstream_id(&body, "/responseId").map(|id| format!("google-form:{id}"));
    enqueue(&state, workflow_id, event_id, "googleForm", form).await
}

/// `POST /api/v1/webhooks/stripe?workflowId=…`
pub async fn stripe(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let secret = state.secrets.stripe.as_deref();
    let workflow_id = accept(&state, &params, &headers, secret, STRIPE_SECRET_HEADER).await?;
    let body = parse_body(&body)?;

    let mut event = pick(
        &body,
        &[
            ("eventId", "id"),
            ("eventType", "type"),
            ("timestamp", "created"),
            ("livemode", "livemode"),
        ],
    );
    if let Some(object) = body.pointer("/data/object") {
        event.insert("raw".into(), object.clone());
    }

    let event_id = upstream_id(&body, "/id").map(|id| format!("stripe:{id}"));
    enqueue(&state, workflow_id, event_id, "stripe", event).await
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

/// Resolve `workflowId`, check the secret, and confirm the workflow exists.
async fn accept(
    state: &AppState,
    params: &Params,
    headers: &HeaderMap,
    expected_secret: Option<&str>,
    secret_name: &str,
) -> Result<Uuid, ApiError> {
    let raw = params
        .get("workflowId")
        .ok_or_else(|| ApiError::BadRequest("Workflow ID not found".into()))?;
    let workflow_id = Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("invalid workflow id: {raw}")))?;

    if let Some(expected) = expected_secret {
        // Header first, then the query parameter of the same name.
        let provided = headers
            .get(secret_name)
            .and_then(|v| v.to_str().ok())
            .or_else(|| params.get(secret_name).map(String::as_str));
        if provided != Some(expected) {
            warn!(workflow_id = %workflow_id, "webhook rejected: invalid secret");
            return Err(ApiError::Unauthorized("Invalid webhook secret".into()));
        }
    }

    match wf_repo::get_workflow(&state.pool, workflow_id).await {
        Ok(_) => Ok(workflow_id),
        Err(db::DbError::NotFound) => {
            Err(ApiError::NotFound(format!("workflow {workflow_id} not found")))
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

/// Copy `(to, from)` fields that are present in `body`.
fn pick(body: &Value, fields: &[(&str, &str)]) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(to, from)| body.get(*from).map(|v| ((*to).to_owned(), v.clone())))
        .collect()
}

fn upstream_id(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn enqueue(
    state: &AppState,
    workflow_id: Uuid,
    event_id: Option<String>,
    key: &str,
    data: Map<String, Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let data = Value::Object(data);
    let mut initial = Map::new();
    initial.insert(key.to_owned(), data.clone());

    let event = match event_id {
        Some(id) => TriggerEvent::with_id(id, workflow_id, initial),
        None => TriggerEvent::new(workflow_id, initial),
    };
    info!(workflow_id = %workflow_id, event_id = %event.id, source = key, "webhook accepted");
    state.triggers.send(event).await?;

    Ok((StatusCode::OK, Json(json!({ "success": true, "data": data }))))
}
