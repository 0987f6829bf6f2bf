//! The `NodeExecutor` trait: the contract every node type must fulfil.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    Context, CredentialStore, NodeError, ProviderSettings, StepRunner, TemplateRenderer,
    status::{publish_status, NodeStatus, StatusChannel, StatusPublisher},
};

/// Everything an executor receives for one node of one run.
pub struct NodeInput<'a> {
    /// Owner of the workflow; scopes credential lookups.
    pub user_id: &'a str,
    pub node_id: &'a str,
    /// The node's opaque configuration map.
    pub data: &'a Value,
    /// Context accumulated by earlier nodes. Ownership moves into the executor.
    pub context: Context,
    pub step: &'a StepRunner,
    pub status: &'a dyn StatusPublisher,
}

/// The core executor trait.
///
/// Implementations publish `loading`, validate their configuration, resolve
/// templated fields, perform at most one side effect inside a step, then
/// publish `success` or `error`. On success the returned context is the input
/// context plus the node's own contribution.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Status channel this executor publishes on.
    fn channel(&self) -> StatusChannel;

    async fn execute(&self, input: NodeInput<'_>) -> Result<Context, NodeError>;
}

/// Shared collaborators for the built-in executors.
#[derive(Clone)]
pub struct ExecutorDeps {
    pub http: reqwest::Client,
    pub templates: Arc<TemplateRenderer>,
    pub providers: ProviderSettings,
    pub credentials: Arc<dyn CredentialStore>,
}

impl ExecutorDeps {
    pub fn new(
        http: reqwest::Client,
        providers: ProviderSettings,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            http,
            templates: Arc::new(TemplateRenderer::new()),
            providers,
            credentials,
        }
    }
}

/// Wrap `work` in the `loading → success | error` status sequence.
pub async fn report<Fut>(
    publisher: &dyn StatusPublisher,
    channel: StatusChannel,
    node_id: &str,
    work: Fut,
) -> Result<Context, NodeError>
where
    Fut: Future<Output = Result<Context, NodeError>>,
{
    publish_status(publisher, channel, node_id, NodeStatus::Loading).await;
    let result = work.await;
    let outcome = match result {
        Ok(_) => NodeStatus::Success,
        Err(_) => NodeStatus::Error,
    };
    publish_status(publisher, channel, node_id, outcome).await;
    result
}

/// Decode a node's `data` map; `null` decodes as the type's default.
pub fn parse_data<T>(node_label: &str, data: &Value) -> Result<T, NodeError>
where
    T: DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data.clone())
        .map_err(|e| NodeError::validation(format!("{node_label}: invalid configuration: {e}")))
}

/// Require a configured, well-formed `variableName`.
pub fn require_variable_name<'a>(
    node_label: &str,
    variable_name: Option<&'a str>,
) -> Result<&'a str, NodeError> {
    let name = variable_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| NodeError::validation(format!("{node_label}: variableName is required")))?;
    crate::context::validate_variable_name(node_label, name)?;
    Ok(name)
}
