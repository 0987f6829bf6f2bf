//! Shared helpers for executor tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::{
    mock::MockCredentialStore,
    status::{BroadcastStatusPublisher, NodeStatus},
    traits::{ExecutorDeps, NodeExecutor, NodeInput},
    Context, NodeError, ProviderSettings, RetryPolicy, StepRunner,
};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn deps() -> ExecutorDeps {
    deps_with(ProviderSettings::default(), MockCredentialStore::default())
}

pub fn deps_with(providers: ProviderSettings, credentials: MockCredentialStore) -> ExecutorDeps {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    ExecutorDeps::new(http, providers, Arc::new(credentials))
}

/// Execute one node as user `u1` / node `n1` and collect its status sequence.
pub async fn run_node(
    executor: &dyn NodeExecutor,
    data: Value,
    context: Context,
) -> (Result<Context, NodeError>, Vec<NodeStatus>) {
    let publisher = BroadcastStatusPublisher::new(16);
    let mut rx = publisher.subscribe();
    let step = StepRunner::new(RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(5),
    });

    let result = executor
        .execute(NodeInput {
            user_id: "u1",
            node_id: "n1",
            data: &data,
            context,
            step: &step,
            status: &publisher,
        })
        .await;

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.channel, executor.channel());
        assert_eq!(event.node_id, "n1");
        statuses.push(event.status);
    }
    (result, statuses)
}
