//! HTTP_REQUEST node: one outbound HTTP call whose response is stored in the
//! context under the node's variable name.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    Context, NodeError,
    status::StatusChannel,
    traits::{parse_data, report, require_variable_name, ExecutorDeps, NodeExecutor, NodeInput},
};

const LABEL: &str = "HTTP request node";

/// Longest response-body excerpt kept in an error message.
const ERROR_BODY_EXCERPT: usize = 200;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    fn sends_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get    => reqwest::Method::GET,
            Self::Post   => reqwest::Method::POST,
            Self::Put    => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch  => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequestData {
    variable_name: Option<String>,
    endpoint: Option<String>,
    method: Option<HttpMethod>,
    body: Option<String>,
}

pub struct HttpRequestExecutor {
    deps: ExecutorDeps,
}

impl HttpRequestExecutor {
    pub fn new(deps: ExecutorDeps) -> Self {
        Self { deps }
    }

    async fn send(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let NodeInput { node_id, data, context, step, .. } = input;
        let data: HttpRequestData = parse_data(LABEL, data)?;

        if data.endpoint.as_deref().map_or(true, |e| e.trim().is_empty()) {
            return Err(NodeError::validation(format!("{LABEL}: endpoint is not configured")));
        }
        let variable_name = require_variable_name(LABEL, data.variable_name.as_deref())?;

        let templates = &self.deps.templates;
        let endpoint = templates.render_required(
            &format!("{LABEL}: endpoint"),
            data.endpoint.as_deref(),
            &context,
        )?;
        let url = Url::parse(endpoint.trim()).map_err(|e| {
            NodeError::validation(format!("{LABEL}: invalid endpoint '{endpoint}': {e}"))
        })?;

        let method = data.method.unwrap_or_default();
        let body = match data.body.as_deref() {
            Some(b) if method.sends_body() => {
                Some(templates.render(&format!("{LABEL}: body"), b, &context)?)
            }
            _ => None,
        };

        debug!(node_id, ?method, host = url.host_str().unwrap_or_default(), "sending HTTP request");

        let client = &self.deps.http;
        let (url, body) = (&url, body.as_deref());
        let response: Value = step
            .run(node_id, "http-request", move || async move {
                let mut request = client.request(method.as_reqwest(), url.clone());
                if method.sends_body() {
                    request = request.header(CONTENT_TYPE, "application/json");
                    if let Some(body) = body {
                        request = request.body(body.to_owned());
                    }
                }
                let response = request.send().await.map_err(|e| transport_error(LABEL, e))?;
                read_response(response).await
            })
            .await?;

        Ok(context.contribute(variable_name, response))
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    fn channel(&self) -> StatusChannel {
        StatusChannel::HttpRequest
    }

    async fn execute(&self, input: NodeInput<'_>) -> Result<Context, NodeError> {
        let (status, node_id) = (input.status, input.node_id);
        report(status, self.channel(), node_id, self.send(input)).await
    }
}

async fn read_response(response: reqwest::Response) -> Result<Value, NodeError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(LABEL, status, &body));
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let data = if is_json {
        response
            .json::<Value>()
            .await
            .map_err(|e| NodeError::permanent(format!("{LABEL}: invalid JSON response: {e}")))?
    } else {
        Value::String(
            response
                .text()
                .await
                .map_err(|e| NodeError::transient(format!("{LABEL}: failed to read response: {e}")))?,
        )
    };

    Ok(json!({
        "status": status.as_u16(),
        "statusText": status.canonical_reason().unwrap_or_default(),
        "data": data,
    }))
}

// ---------------------------------------------------------------------------
// Outbound-call error classification shared by every executor
// ---------------------------------------------------------------------------

/// 429 and 5xx are worth retrying; any other non-2xx is not.
pub(crate) fn status_error(label: &str, status: StatusCode, body: &str) -> NodeError {
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    let message = if excerpt.trim().is_empty() {
        format!("{label}: request failed with status {status}")
    } else {
        format!("{label}: request failed with status {status}: {}", excerpt.trim())
    };
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        NodeError::transient(message)
    } else {
        NodeError::permanent(message)
    }
}

pub(crate) fn transport_error(label: &str, err: reqwest::Error) -> NodeError {
    if err.is_builder() {
        NodeError::validation(format!("{label}: invalid request: {err}"))
    } else {
        NodeError::transient(format!("{label}: request failed: {err}"))
    }
}
