//! Backend adapters
//!
//! Each adapter translates the canonical chat request into one provider's native
//! shape and the provider's answer back into a [`CanonicalResponse`]:
//! - `local`: an Ollama-style server (`/api/chat`, `/api/tags`)
//! - `remote`: an OpenAI-compatible API (`/chat/completions`, DeepSeek by default)
//!
//! Adapters never retry; fallback is the router's job.

pub mod local;
pub mod probe;
pub mod remote;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::BackendError;
use crate::types::{CanonicalRequest, CanonicalResponse};

pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Static, read-only description of one provider
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    /// Human-readable provider name, also used as `owned_by` in model listings
    pub name: String,
    /// Base URL without a trailing slash
    pub base_url: String,
    /// Bearer credential, if the provider needs one
    pub auth_token: Option<String>,
    /// Upper bound for one inference call
    pub request_timeout: Duration,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            request_timeout,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Join a path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// A provider that can serve a canonical chat request
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Translate, call the provider once, and translate the answer back
    async fn invoke(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, BackendError>;
}

/// Answers whether a model can be served locally right now
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelProbe: Send + Sync {
    /// Never fails: every error path resolves to `false`
    async fn is_available(&self, model: &str) -> bool;
}

/// Read a failed response into a `BackendError`, keeping the body short
pub(crate) async fn error_from_status(backend: &str, response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Http {
        backend: backend.to_string(),
        status: Some(status),
        message: crate::truncate_safe(body.trim(), 200).to_string(),
    }
}
