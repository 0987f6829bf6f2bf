//! Maps node types to their executors.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{
    ChatExecutor, ChatPlatform, ExecutorDeps, HttpRequestExecutor, LlmExecutor, LlmProvider,
    NodeExecutor, PassthroughExecutor,
};

use crate::models::NodeType;

/// Executor lookup table, built once at startup and shared by every run.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// An empty registry. Tests fill it with mocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// One built-in executor per node type.
    pub fn builtin(deps: ExecutorDeps) -> Self {
        let mut registry = Self::new();
        registry
            .register(NodeType::Initial, PassthroughExecutor::initial())
            .register(NodeType::ManualTrigger, PassthroughExecutor::manual_trigger())
            .register(NodeType::GoogleFormTrigger, PassthroughExecutor::google_form_trigger())
            .register(NodeType::StripeTrigger, PassthroughExecutor::stripe_trigger())
            .register(NodeType::HttpRequest, HttpRequestExecutor::new(deps.clone()))
            .register(NodeType::OpenAi, LlmExecutor::new(LlmProvider::OpenAi, deps.clone()))
            .register(NodeType::Anthropic, LlmExecutor::new(LlmProvider::Anthropic, deps.clone()))
            .register(NodeType::Gemini, LlmExecutor::new(LlmProvider::Gemini, deps.clone()))
            .register(NodeType::Discord, ChatExecutor::new(ChatPlatform::Discord, deps.clone()))
            .register(NodeType::Slack, ChatExecutor::new(ChatPlatform::Slack, deps));
        registry
    }

    /// Register (or replace) the executor for `node_type`.
    pub fn register<E>(&mut self, node_type: NodeType, executor: E) -> &mut Self
    where
        E: NodeExecutor + 'static,
    {
        self.executors.insert(node_type, Arc::new(executor));
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&node_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.executors.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("ExecutorRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::{mock::MockNode, ProviderSettings, StatusChannel};
    use serde_json::json;

    fn deps() -> ExecutorDeps {
        ExecutorDeps::new(
            reqwest::Client::new(),
            ProviderSettings::default(),
            Arc::new(nodes::mock::MockCredentialStore::default()),
        )
    }

    #[test]
    fn builtin_covers_every_node_type() {
        let registry = ExecutorRegistry::builtin(deps());
        assert_eq!(registry.len(), NodeType::ALL.len());

        let expected = [
            (NodeType::Initial, StatusChannel::Initial),
            (NodeType::ManualTrigger, StatusChannel::ManualTrigger),
            (NodeType::GoogleFormTrigger, StatusChannel::GoogleFormTrigger),
            (NodeType::StripeTrigger, StatusChannel::StripeTrigger),
            (NodeType::HttpRequest, StatusChannel::HttpRequest),
            (NodeType::OpenAi, StatusChannel::OpenAi),
            (NodeType::Anthropic, StatusChannel::Anthropic),
            (NodeType::Gemini, StatusChannel::Gemini),
            (NodeType::Discord, StatusChannel::Discord),
            (NodeType::Slack, StatusChannel::Slack),
        ];
        for (node_type, channel) in expected {
            assert_eq!(registry.get(node_type).unwrap().channel(), channel, "{node_type}");
        }
    }

    #[test]
    fn register_replaces_existing_executor() {
        let mut registry = ExecutorRegistry::builtin(deps());
        registry.register(
            NodeType::Slack,
            MockNode::returning("mock", json!({})).on_channel(StatusChannel::Discord),
        );
        assert_eq!(registry.len(), NodeType::ALL.len());
        assert_eq!(registry.get(NodeType::Slack).unwrap().channel(), StatusChannel::Discord);
    }

    #[test]
    fn empty_registry_has_no_executors() {
        assert!(ExecutorRegistry::new().get(NodeType::Initial).is_none());
    }
}
