//! Canonical request/response types
//!
//! These are the gateway's provider-agnostic shapes. On the wire they follow the
//! OpenAI chat-completions format; each backend adapter translates to and from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Default sampling temperature when the caller omits it
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion budget when the caller omits it
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Convert to OpenAI-style role string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the conversation transcript (oldest first)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
}

impl CanonicalMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Content may arrive as a string, null, or an array of `{"type":"text"}` parts.
fn deserialize_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Array(parts) => Ok(parts
            .iter()
            .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("")),
        other => Err(serde::de::Error::custom(format!(
            "message content must be a string, got {}",
            other
        ))),
    }
}

/// A validated chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl CanonicalRequest {
    /// Build a request with default sampling parameters
    pub fn new(model: impl Into<String>, messages: Vec<CanonicalMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
        }
    }

    /// Parse and validate an inbound request body.
    ///
    /// Presence checks run before typed deserialization so a missing field is
    /// reported by name rather than as a serde error.
    pub fn from_body(body: &Value) -> Result<Self, ValidationError> {
        let object = match body.as_object() {
            Some(object) if !object.is_empty() => object,
            _ => return Err(ValidationError::EmptyBody),
        };

        if !object.contains_key("messages") {
            return Err(ValidationError::MissingField("messages"));
        }
        if !object.contains_key("model") {
            return Err(ValidationError::MissingField("model"));
        }

        let request: CanonicalRequest = serde_json::from_value(body.clone())
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        if request.model.trim().is_empty() {
            return Err(ValidationError::Malformed("'model' must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&request.temperature) {
            return Err(ValidationError::Malformed(
                "'temperature' must be between 0 and 2".to_string(),
            ));
        }
        if request.max_tokens == 0 {
            return Err(ValidationError::Malformed(
                "'max_tokens' must be a positive integer".to_string(),
            ));
        }

        Ok(request)
    }
}

/// Why a completion stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

impl FinishReason {
    /// Map a provider's free-form finish reason onto the canonical set
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some(_) => FinishReason::Error,
        }
    }
}

/// Token accounting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// The single terminal result of a routed request.
///
/// Serialized as an OpenAI `chat.completion` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ChatCompletion", try_from = "ChatCompletion")]
pub struct CanonicalResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// OpenAI chat.completion wire object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    #[serde(default = "chat_completion_object")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

fn chat_completion_object() -> String {
    "chat.completion".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
}

impl From<CanonicalResponse> for ChatCompletion {
    fn from(response: CanonicalResponse) -> Self {
        let finish_reason = match response.finish_reason {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::Error => "error",
        };
        ChatCompletion {
            id: response.id,
            object: chat_completion_object(),
            created: response.created,
            model: response.model,
            choices: vec![ChatChoice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content: response.content,
                },
                finish_reason: Some(finish_reason.to_string()),
            }],
            usage: Some(response.usage),
        }
    }
}

impl TryFrom<ChatCompletion> for CanonicalResponse {
    type Error = String;

    fn try_from(completion: ChatCompletion) -> Result<Self, Self::Error> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "response contains no choices".to_string())?;

        Ok(CanonicalResponse {
            id: completion.id,
            created: completion.created,
            model: completion.model,
            content: choice.message.content,
            finish_reason: FinishReason::from_provider(choice.finish_reason.as_deref()),
            usage: completion.usage.unwrap_or_default(),
        })
    }
}

/// Which of the two configured backends served (or should serve) a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}
