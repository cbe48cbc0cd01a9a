//! Gateway error taxonomy
//!
//! `BackendError` is produced once per adapter call and recovered by the router.
//! Only `ValidationError`, `RoutingError` and `AccessError` ever reach a caller.

use thiserror::Error;

use crate::types::BackendKind;

/// Coarse classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Timeout,
    Http,
    Auth,
    MalformedResponse,
}

impl BackendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::Http => "http error",
            BackendErrorKind::Auth => "authentication failure",
            BackendErrorKind::MalformedResponse => "malformed response",
        }
    }
}

/// A single failed call to a backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} did not answer within {timeout_secs}s")]
    Timeout { backend: String, timeout_secs: u64 },

    #[error("{backend} request failed{}: {message}", status_suffix(.status))]
    Http {
        backend: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{backend} rejected the configured credentials (HTTP {status})")]
    Auth { backend: String, status: u16 },

    #[error("{backend} returned a malformed response: {reason}")]
    MalformedResponse { backend: String, reason: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {}", s)).unwrap_or_default()
}

impl BackendError {
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::Timeout { .. } => BackendErrorKind::Timeout,
            BackendError::Http { .. } => BackendErrorKind::Http,
            BackendError::Auth { .. } => BackendErrorKind::Auth,
            BackendError::MalformedResponse { .. } => BackendErrorKind::MalformedResponse,
        }
    }

    /// HTTP status reported by the backend, if the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Http { status, .. } => *status,
            BackendError::Auth { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Kind and status only; upstream bodies and URLs stay in the logs
    pub fn summary(&self) -> String {
        match self.status() {
            Some(status) => format!("{} (HTTP {})", self.kind().as_str(), status),
            None => self.kind().as_str().to_string(),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(backend: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout {
                backend: backend.to_string(),
                timeout_secs,
            }
        } else if err.is_decode() {
            BackendError::MalformedResponse {
                backend: backend.to_string(),
                reason: err.to_string(),
            }
        } else {
            BackendError::Http {
                backend: backend.to_string(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

/// Every eligible backend was tried and failed
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("all backends failed (last attempt: {last_backend}): {last_error}")]
    AllBackendsFailed {
        attempted: Vec<BackendKind>,
        last_backend: BackendKind,
        #[source]
        last_error: BackendError,
    },
}

impl RoutingError {
    /// Message returned to HTTP callers
    pub fn public_message(&self) -> String {
        match self {
            RoutingError::AllBackendsFailed { last_backend, last_error, .. } => {
                format!("all backends failed (last attempt: {}): {}", last_backend, last_error.summary())
            }
        }
    }
}

/// Malformed or incomplete inbound request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No input data provided")]
    EmptyBody,

    #[error("Missing '{0}' parameter")]
    MissingField(&'static str),

    #[error("Invalid request: {0}")]
    Malformed(String),
}

/// Boundary rejection, produced before the router runs
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Invalid or missing API key")]
    InvalidKey,

    #[error("Rate limit exceeded")]
    RateLimited,
}
