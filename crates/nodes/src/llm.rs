//! OPENAI, ANTHROPIC and GEMINI nodes: one text completion per node.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    credentials::{CredentialKind, CredentialLookupError},
    http_request::{status_error, transport_error},
    status::StatusChannel,
    traits::{parse_data, report, require_variable_name, ExecutorDeps, NodeExecutor, NodeInput},
    Context, NodeError,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl LlmProvider {
    fn label(self) -> &'static str {
        match self {
            Self::OpenAi    => "OpenAI node",
            Self::Anthropic => "Anthropic node",
            Self::Gemini    => "Gemini node",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi    => "gpt-4o",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Gemini    => "gemini-2.5-flash",
        }
    }

    fn credential_kind(self) -> CredentialKind {
        match self {
            Self::OpenAi    => CredentialKind::OpenAi,
            Self::Anthropic => CredentialKind::Anthropic,
            Self::Gemini    => CredentialKind::Gemini,
        }
    }

    /// Environment variable the fallback key is read from.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::OpenAi    => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini    => "GOOGLE_GENERATIVE_AI_API_KEY",
        }
    }

    /// Key of the completion text inside the node's contribution.
    fn output_key(self) -> &'static str {
        match self {
            Self::Gemini => "aiResponse",
            _            => "response",
        }
    }

    fn step_name(self) -> &'static str {
        match self {
            Self::OpenAi    => "openai-generate-text",
            Self::Anthropic => "anthropic-generate-text",
            Self::Gemini    => "gemini-generate-text",
        }
    }
}

/// Provider endpoints and environment fallback keys.
#[derive(Clone)]
pub struct ProviderSettings {
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub gemini_base_url: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com".into(),
            anthropic_base_url: "https://api.anthropic.com".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl ProviderSettings {
    fn base_url(&self, provider: LlmProvider) -> &str {
        let url = match provider {
            LlmProvider::OpenAi    => &self.openai_base_url,
            LlmProvider::Anthropic => &self.anthropic_base_url,
            LlmProvider::Gemini    => &self.gemini_base_url,
        };
        url.trim_end_matches('/')
    }

    fn fallback_key(&self, provider: LlmProvider) -> Option<&str> {
        match provider {
            LlmProvider::OpenAi    => self.openai_api_key.as_deref(),
            LlmProvider::Anthropic => self.anthropic_api_key.as_deref(),
            LlmProvider::Gemini    => self.gemini_api_key.as_deref(),
        }
        .filter(|k| !k.is_empty())
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderSettings")
            .field("openai_base_url", &self.openai_base_url)
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmData {
    variable_name: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    user_prompt: Option<String>,
    credential_id: Option<String>,
}

/// A fully resolved completion request.
struct Prompt {
    model: String,
    system: String,
    user: String,
}

pub struct LlmExecutor {
    provider: LlmProvider,
    deps: ExecutorDeps,
}

impl LlmExecutor {
    pub fn new(provider: LlmProvider, deps: ExecutorDeps) -> Self {
        Self { provider, deps }
    }

    async fn generate(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let NodeInput { user_id, node_id, data, context, step, .. } = input;
        let label = self.provider.label();
        let data: LlmData = parse_data(label, data)?;
        let variable_name = require_variable_name(label, data.variable_name.as_deref())?;

        let templates = &self.deps.templates;
        let system = match data.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(t) => templates.render(&format!("{label}: systemPrompt"), t, &context)?,
            None => DEFAULT_SYSTEM_PROMPT.to_owned(),
        };
        let user = templates.render_required(
            &format!("{label}: userPrompt"),
            data.user_prompt.as_deref(),
            &context,
        )?;
        let prompt = Prompt {
            model: data
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.provider.default_model().to_owned()),
            system,
            user,
        };

        let api_key = self.api_key(user_id, data.credential_id.as_deref()).await?;
        debug!(node_id, provider = ?self.provider, model = %prompt.model, "requesting completion");

        let (prompt, api_key) = (&prompt, api_key.as_str());
        let text: String = step
            .run(node_id, self.provider.step_name(), move || async move {
                self.complete(prompt, api_key).await
            })
            .await?;

        Ok(context.contribute(variable_name, json!({ self.provider.output_key(): text })))
    }

    /// Key from the referenced credential, else the configured fallback.
    async fn api_key(&self, user_id: &str, credential_id: Option<&str>) -> Result<String, NodeError> {
        let label = self.provider.label();
        let expected = self.provider.credential_kind();

        if let Some(id) = credential_id.filter(|id| !id.trim().is_empty()) {
            let credential = self
                .deps
                .credentials
                .get_credential(id, user_id)
                .await
                .map_err(|e| match e {
                    CredentialLookupError::NotFound => {
                        NodeError::credential(format!("{label}: credential {id} not found"))
                    }
                    CredentialLookupError::Unavailable(msg) => {
                        NodeError::credential(format!("{label}: credential {id} unavailable: {msg}"))
                    }
                })?;
            if credential.kind != expected {
                return Err(NodeError::credential(format!(
                    "{label}: credential {id} is a {} credential, expected {expected}",
                    credential.kind
                )));
            }
            return Ok(credential.value);
        }

        self.deps
            .providers
            .fallback_key(self.provider)
            .map(str::to_owned)
            .ok_or_else(|| {
                NodeError::credential(format!("{label}: {} is not set", self.provider.env_var()))
            })
    }

    async fn complete(&self, prompt: &Prompt, api_key: &str) -> Result<String, NodeError> {
        let label = self.provider.label();
        let base = self.deps.providers.base_url(self.provider);
        let client = &self.deps.http;

        let request = match self.provider {
            LlmProvider::OpenAi => client
                .post(format!("{base}/v1/chat/completions"))
                .bearer_auth(api_key)
                .json(&json!({
                    "model": prompt.model,
                    "messages": [
                        { "role": "system", "content": prompt.system },
                        { "role": "user", "content": prompt.user },
                    ],
                })),
            LlmProvider::Anthropic => client
                .post(format!("{base}/v1/messages"))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": prompt.model,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "system": prompt.system,
                    "messages": [{ "role": "user", "content": prompt.user }],
                })),
            LlmProvider::Gemini => client
                .post(format!("{base}/v1beta/models/{}:generateContent", prompt.model))
                .header("x-goog-api-key", api_key)
                .json(&json!({
                    "systemInstruction": { "parts": [{ "text": prompt.system }] },
                    "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
                })),
        };

        let response = request.send().await.map_err(|e| transport_error(label, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(label, status, &body));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| NodeError::permanent(format!("{label}: invalid response: {e}")))?;

        Ok(self.extract_text(&body).unwrap_or_default().to_owned())
    }

    fn extract_text<'a>(&self, body: &'a Value) -> Option<&'a str> {
        match self.provider {
            LlmProvider::OpenAi => body["choices"][0]["message"]["content"].as_str(),
            LlmProvider::Anthropic => body["content"]
                .as_array()?
                .iter()
                .find(|block| block["type"] == "text")?["text"]
                .as_str(),
            LlmProvider::Gemini => body["candidates"][0]["content"]["parts"][0]["text"].as_str(),
        }
    }
}

#[async_trait]
impl NodeExecutor for LlmExecutor {
    fn channel(&self) -> StatusChannel {
        match self.provider {
            LlmProvider::OpenAi    => StatusChannel::OpenAi,
            LlmProvider::Anthropic => StatusChannel::Anthropic,
            LlmProvider::Gemini    => StatusChannel::Gemini,
        }
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let (status, node_id) = (input.status, input.node_id);
        report(status, self.channel(), node_id, self.generate(input)).await
    }
}
