//! Remote backend adapter (OpenAI-compatible chat completions, DeepSeek by default)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{error_from_status, BackendDescriptor, ChatBackend};
use crate::config::ModelVariant;
use crate::error::BackendError;
use crate::types::{
    CanonicalMessage, CanonicalRequest, CanonicalResponse, FinishReason, Usage,
};

#[derive(Debug, Serialize)]
struct RemoteChatRequest<'a> {
    model: &'a str,
    messages: &'a [CanonicalMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Pick the remote model identifier for a requested model name.
///
/// The first variant whose token appears in the (lower-cased) name wins.
pub fn select_model<'a>(requested: &str, variants: &'a [ModelVariant], default_model: &'a str) -> &'a str {
    let lower = requested.to_lowercase();
    variants
        .iter()
        .find(|v| lower.contains(&v.token.to_lowercase()))
        .map(|v| v.model.as_str())
        .unwrap_or(default_model)
}

/// Concatenate a server-sent-events body into one response
pub fn parse_event_stream(body: &str) -> Result<CanonicalResponse, String> {
    let mut id = None;
    let mut created = None;
    let mut model = None;
    let mut content = String::new();
    let mut finish_reason = None;
    let mut usage = None;
    let mut chunks = 0usize;

    for line in body.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        let chunk: StreamChunk =
            serde_json::from_str(data).map_err(|e| format!("invalid stream event: {}", e))?;
        chunks += 1;

        if id.is_none() {
            id = chunk.id;
        }
        if created.is_none() {
            created = chunk.created;
        }
        if model.is_none() {
            model = chunk.model;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                content.push_str(&text);
            }
            if choice.finish_reason.is_some() {
                finish_reason = choice.finish_reason;
            }
        }
    }

    if chunks == 0 {
        return Err("event stream contained no data events".to_string());
    }

    Ok(CanonicalResponse {
        id: id.unwrap_or_default(),
        created: created.unwrap_or_default(),
        model: model.unwrap_or_default(),
        content,
        finish_reason: FinishReason::from_provider(finish_reason.as_deref()),
        usage: usage.unwrap_or_default(),
    })
}

/// OpenAI-compatible hosted provider
#[derive(Clone)]
pub struct RemoteBackend {
    client: Client,
    descriptor: BackendDescriptor,
    default_model: String,
    variants: Vec<ModelVariant>,
}

impl RemoteBackend {
    pub fn new(descriptor: BackendDescriptor, default_model: impl Into<String>, variants: Vec<ModelVariant>) -> Self {
        Self {
            client: Client::new(),
            descriptor,
            default_model: default_model.into(),
            variants,
        }
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    /// Remote model identifier used for a requested model name
    pub fn model_for(&self, requested: &str) -> &str {
        select_model(requested, &self.variants, &self.default_model)
    }
}

#[async_trait]
impl ChatBackend for RemoteBackend {
    async fn invoke(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, BackendError> {
        let name = &self.descriptor.name;
        let timeout = self.descriptor.request_timeout;
        let payload = RemoteChatRequest {
            model: self.model_for(&request.model),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: request.stream,
        };

        debug!("Remote request: {} -> {}", request.model, payload.model);

        let mut req_builder = self
            .client
            .post(self.descriptor.endpoint("chat/completions"))
            .timeout(timeout);
        if let Some(token) = &self.descriptor.auth_token {
            req_builder = req_builder.bearer_auth(token);
        }

        let response = req_builder
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(name, timeout.as_secs(), e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Auth {
                backend: name.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(error_from_status(name, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::from_reqwest(name, timeout.as_secs(), e))?;

        let parsed = if request.stream {
            parse_event_stream(&body)
        } else {
            serde_json::from_str::<CanonicalResponse>(body.trim()).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| BackendError::MalformedResponse {
            backend: name.clone(),
            reason,
        })
    }
}
