//! DISCORD and SLACK nodes: post one message to an incoming webhook.
//!
//! Webhook posts are not idempotent. A step retried after a timeout may
//! deliver the message twice.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    http_request::{status_error, transport_error},
    status::StatusChannel,
    traits::{parse_data, report, require_variable_name, ExecutorDeps, NodeExecutor, NodeInput},
    Context, NodeError,
};

/// Discord rejects message content longer than this many characters.
pub const DISCORD_MAX_CONTENT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPlatform {
    Discord,
    Slack,
}

impl ChatPlatform {
    fn label(self) -> &'static str {
        match self {
            Self::Discord => "Discord node",
            Self::Slack   => "Slack node",
        }
    }

    fn step_name(self) -> &'static str {
        match self {
            Self::Discord => "discord-webhook",
            Self::Slack   => "slack-webhook",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatData {
    variable_name: Option<String>,
    webhook_url: Option<String>,
    content: Option<String>,
    /// Discord only.
    username: Option<String>,
}

pub struct ChatExecutor {
    platform: ChatPlatform,
    deps: ExecutorDeps,
}

impl ChatExecutor {
    pub fn new(platform: ChatPlatform, deps: ExecutorDeps) -> Self {
        Self { platform, deps }
    }

    async fn post(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let NodeInput { node_id, data, context, step, .. } = input;
        let label = self.platform.label();
        let data: ChatData = parse_data(label, data)?;
        let variable_name = require_variable_name(label, data.variable_name.as_deref())?;

        if data.content.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(NodeError::validation(format!("{label}: content is required")));
        }

        let templates = &self.deps.templates;
        let webhook_url = templates.render_required(
            &format!("{label}: webhookUrl"),
            data.webhook_url.as_deref(),
            &context,
        )?;
        let mut content = templates.render_required(
            &format!("{label}: content"),
            data.content.as_deref(),
            &context,
        )?;

        let payload = match self.platform {
            ChatPlatform::Discord => {
                content = content.chars().take(DISCORD_MAX_CONTENT).collect();
                let username = match data.username.as_deref() {
                    Some(t) => Some(templates.render(&format!("{label}: username"), t, &context)?),
                    None => None,
                }
                .filter(|u| !u.trim().is_empty());
                json!({ "content": content, "username": username })
            }
            ChatPlatform::Slack => json!({ "text": content }),
        };

        debug!(node_id, platform = ?self.platform, chars = content.chars().count(), "posting chat message");

        let client = &self.deps.http;
        let (webhook_url, payload) = (webhook_url.as_str(), &payload);
        step.run(node_id, self.platform.step_name(), move || async move {
            let response = client
                .post(webhook_url)
                .json(payload)
                .send()
                .await
                .map_err(|e| transport_error(label, e))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(label, status, &body));
            }
            Ok(())
        })
        .await?;

        Ok(context.contribute(variable_name, json!({ "messageContent": content })))
    }
}

#[async_trait]
impl NodeExecutor for ChatExecutor {
    fn channel(&self) -> StatusChannel {
        match self.platform {
            ChatPlatform::Discord => StatusChannel::Discord,
            ChatPlatform::Slack   => StatusChannel::Slack,
        }
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let (status, node_id) = (input.status, input.node_id);
        report(status, self.channel(), node_id, self.post(input)).await
    }
}
