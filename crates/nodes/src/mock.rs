//! Test doubles: `MockNode` for `NodeExecutor` and `MockCredentialStore`.
//!
//! Useful in unit and integration tests where a real executor would reach
//! the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    credentials::{Credential, CredentialKind, CredentialLookupError, CredentialStore},
    status::StatusChannel,
    traits::{report, NodeExecutor, NodeInput},
    Context, NodeError,
};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Contribute this value under the node's `variableName`, if it has one.
    Contribute(Value),
    /// Fail with a retryable external error.
    FailRetryable(String),
    /// Fail with a non-retryable external error.
    FailFatal(String),
    /// Fail configuration validation before any step runs.
    FailValidation(String),
}

/// A mock executor that records every context it is invoked with and
/// returns a programmer-specified result.
///
/// Clones share the same call log, so a test can keep one handle while the
/// registry owns another.
#[derive(Debug, Clone)]
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    pub behaviour: MockBehaviour,
    pub channel: StatusChannel,
    /// Contexts seen by the node's step, one per attempt.
    pub calls: Arc<Mutex<Vec<Context>>>,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            channel: StatusChannel::HttpRequest,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that always succeeds, contributing `value`.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Contribute(value))
    }

    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    pub fn failing_validation(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailValidation(msg.into()))
    }

    /// Publish on `channel` instead of the default HTTP request channel.
    pub fn on_channel(mut self, channel: StatusChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Number of times this node's step has been attempted.
    pub fn call_count(&self) -> usize {
        self.log().len()
    }

    /// Contexts received so far, in call order.
    pub fn calls(&self) -> Vec<Context> {
        self.log().clone()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<Context>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let NodeInput { node_id, data, context, step, .. } = input;

        if let MockBehaviour::FailValidation(msg) = &self.behaviour {
            return Err(NodeError::validation(msg.clone()));
        }

        let ctx = &context;
        let value = step
            .run(node_id, "mock", move || async move {
                self.log().push(ctx.clone());
                match &self.behaviour {
                    MockBehaviour::Contribute(v) => Ok(v.clone()),
                    MockBehaviour::FailRetryable(msg) => Err(NodeError::transient(msg.clone())),
                    MockBehaviour::FailFatal(msg) => Err(NodeError::permanent(msg.clone())),
                    MockBehaviour::FailValidation(msg) => Err(NodeError::validation(msg.clone())),
                }
            })
            .await?;

        Ok(match data.get("variableName").and_then(Value::as_str) {
            Some(name) => context.contribute(name, value),
            None => context,
        })
    }
}

#[async_trait]
impl NodeExecutor for MockNode {
    fn channel(&self) -> StatusChannel {
        self.channel
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let (status, node_id) = (input.status, input.node_id);
        report(status, self.channel, node_id, self.run(input)).await
    }
}

/// In-memory credential store keyed by `(credential_id, user_id)`.
#[derive(Debug, Default, Clone)]
pub struct MockCredentialStore {
    entries: HashMap<(String, String), Credential>,
}

impl MockCredentialStore {
    pub fn with(
        mut self,
        credential_id: &str,
        user_id: &str,
        kind: CredentialKind,
        value: &str,
    ) -> Self {
        self.entries.insert(
            (credential_id.to_owned(), user_id.to_owned()),
            Credential {
                kind,
                value: value.to_owned(),
            },
        );
        self
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn get_credential(
        &self,
        credential_id: &str,
        user_id: &str,
    ) -> Result<Credential, CredentialLookupError> {
        self.entries
            .get(&(credential_id.to_owned(), user_id.to_owned()))
            .cloned()
            .ok_or(CredentialLookupError::NotFound)
    }
}
