//! Local backend adapter (Ollama-style API)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{error_from_status, BackendDescriptor, ChatBackend};
use crate::error::BackendError;
use crate::types::{
    CanonicalMessage, CanonicalRequest, CanonicalResponse, FinishReason, Role, Usage,
};

/// Separator between a folded system prompt and the first user turn
pub const SYSTEM_PROMPT_SEPARATOR: &str = "\n\n";

/// Prefix for response ids synthesized from the backend's native id
pub const RESPONSE_ID_PREFIX: &str = "chatcmpl-";

/// Native chat request
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NativeChatRequest {
    pub model: String,
    pub messages: Vec<NativeMessage>,
    pub options: NativeOptions,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NativeOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

/// Native chat response, or one chunk of a streamed response
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NativeChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub message: Option<NativeMessage>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Translate a canonical request into the local backend's native shape.
///
/// System messages are removed (the last one wins) and their content is folded
/// into the first remaining message. With no remaining message the system prompt
/// is dropped.
pub fn to_native(request: &CanonicalRequest) -> NativeChatRequest {
    let mut system_prompt: Option<&str> = None;
    let mut messages: Vec<NativeMessage> = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        match message.role {
            Role::System => system_prompt = Some(&message.content),
            role => messages.push(NativeMessage {
                role: role.as_str().to_string(),
                content: message.content.clone(),
            }),
        }
    }

    if let (Some(system), Some(first)) = (system_prompt.filter(|s| !s.is_empty()), messages.first_mut()) {
        first.content = format!("{}{}{}", system, SYSTEM_PROMPT_SEPARATOR, first.content);
    }

    NativeChatRequest {
        model: request.model.clone(),
        messages,
        options: NativeOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
        stream: request.stream,
    }
}

/// Translate a native response back into the canonical shape
pub fn from_native(response: NativeChatResponse, requested_model: &str, created: i64) -> CanonicalResponse {
    let content = response.message.map(|m| m.content).unwrap_or_default();
    let native_id = response
        .id
        .unwrap_or_else(|| format!("local-{}", uuid::Uuid::new_v4().simple()));
    let words = content.split_whitespace().count() as u32;

    CanonicalResponse {
        id: format!("{}{}", RESPONSE_ID_PREFIX, native_id),
        created,
        model: requested_model.to_string(),
        content,
        finish_reason: FinishReason::Stop,
        usage: Usage {
            prompt_tokens: 0,
            completion_tokens: words,
            total_tokens: words,
        },
    }
}

/// Parse a chat body, either one JSON object or newline-delimited stream chunks.
///
/// Stream chunks are concatenated into a single response.
pub fn parse_chat_body(body: &str) -> Result<NativeChatResponse, String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err("empty body".to_string());
    }

    if let Ok(single) = serde_json::from_str::<NativeChatResponse>(trimmed) {
        if single.message.is_none() {
            return Err("response has no 'message' field".to_string());
        }
        return Ok(single);
    }

    let mut merged = NativeChatResponse::default();
    let mut content = String::new();
    let mut role = None;

    for (line_no, line) in trimmed.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        let chunk: NativeChatResponse = serde_json::from_str(line)
            .map_err(|e| format!("invalid chunk on line {}: {}", line_no + 1, e))?;
        if merged.id.is_none() {
            merged.id = chunk.id;
        }
        if chunk.model.is_some() {
            merged.model = chunk.model;
        }
        if let Some(message) = chunk.message {
            role.get_or_insert(message.role);
            content.push_str(&message.content);
        }
        merged.done = chunk.done;
    }

    merged.message = Some(NativeMessage {
        role: role.unwrap_or_else(|| "assistant".to_string()),
        content,
    });
    Ok(merged)
}

/// Ollama-style local inference server
#[derive(Clone)]
pub struct LocalBackend {
    client: Client,
    descriptor: BackendDescriptor,
    probe_timeout: Duration,
}

impl LocalBackend {
    pub fn new(descriptor: BackendDescriptor, probe_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            descriptor,
            probe_timeout,
        }
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    /// Model names reported by the backend's inventory, bounded by the probe timeout
    pub async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let name = &self.descriptor.name;
        let response = self
            .client
            .get(self.descriptor.endpoint("api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(name, self.probe_timeout.as_secs(), e))?;

        if !response.status().is_success() {
            return Err(error_from_status(name, response).await);
        }

        let tags: TagsResponse = response.json().await.map_err(|e| BackendError::MalformedResponse {
            backend: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    async fn invoke(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, BackendError> {
        let name = &self.descriptor.name;
        let timeout = self.descriptor.request_timeout;
        let payload = to_native(request);

        debug!(
            "Local request: model={}, {} native messages, stream={}",
            payload.model,
            payload.messages.len(),
            payload.stream
        );

        let response = self
            .client
            .post(self.descriptor.endpoint("api/chat"))
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(name, timeout.as_secs(), e))?;

        if !response.status().is_success() {
            return Err(error_from_status(name, response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| BackendError::from_reqwest(name, timeout.as_secs(), e))?;

        let native = parse_chat_body(&body).map_err(|reason| BackendError::MalformedResponse {
            backend: name.clone(),
            reason,
        })?;

        Ok(from_native(native, &request.model, chrono::Utc::now().timestamp()))
    }
}
