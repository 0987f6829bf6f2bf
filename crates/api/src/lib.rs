//! `api` crate: HTTP surface of nodeflow.
//!
//! Routes:
//!   POST   /api/v1/workflows/:id/execute      manual trigger, 202 `{ eventId }`
//!   GET    /api/v1/workflows/:id/executions   recent executions, newest first
//!   GET    /api/v1/executions/:id
//!   POST   /api/v1/webhooks/google-form?workflowId=…
//!   POST   /api/v1/webhooks/stripe?workflowId=…
//!   GET    /api/v1/status/stream              node status events as SSE
//!
//! Handlers never run workflows themselves: they enqueue a
//! [`queue::TriggerEvent`] for the engine's worker.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use db::DbPool;
use nodes::BroadcastStatusPublisher;
use queue::TriggerSender;

pub use error::ApiError;

/// Shared secrets the webhook routes compare against. `None` disables the
/// check for that provider.
#[derive(Clone, Default)]
pub struct WebhookSecrets {
    pub google_form: Option<String>,
    pub stripe: Option<String>,
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecrets")
            .field("google_form", &self.google_form.as_ref().map(|_| "<redacted>"))
            .field("stripe", &self.stripe.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub triggers: TriggerSender,
    pub status: Arc<BroadcastStatusPublisher>,
    pub secrets: WebhookSecrets,
}

/// Build the router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/workflows/:id/executions", get(handlers::executions::list))
        .route("/executions/:id", get(handlers::executions::get))
        .route("/webhooks/google-form", post(handlers::webhooks::google_form))
        .route("/webhooks/stripe", post(handlers::webhooks::stripe))
        .route("/status/stream", get(handlers::status::stream));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` is cancelled.
pub async fn serve(bind: &str, state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use db::{pool::create_memory_pool, DbPool};
    use nodes::BroadcastStatusPublisher;
    use queue::TriggerReceiver;

    use crate::{router, AppState, WebhookSecrets};

    pub struct TestApp {
        pub router: Router,
        pub pool: DbPool,
        pub triggers: TriggerReceiver,
        pub status: Arc<BroadcastStatusPublisher>,
    }

    pub async fn app(secrets: WebhookSecrets) -> TestApp {
        let pool = create_memory_pool().await.unwrap();
        let (tx, rx) = queue::channel(8);
        let status = Arc::new(BroadcastStatusPublisher::new(16));
        let state = AppState {
            pool: pool.clone(),
            triggers: tx,
            status: status.clone(),
            secrets,
        };
        TestApp { router: router(state), pool, triggers: rx, status }
    }

    /// Send one request and decode the JSON response body.
    pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }
}
