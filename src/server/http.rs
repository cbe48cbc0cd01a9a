//! HTTP handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::backend::probe::inventory_or_empty;
use crate::error::{AccessError, RoutingError, ValidationError};
use crate::server::ServerState;
use crate::types::CanonicalRequest;

/// Errors surfaced to HTTP callers as JSON bodies
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Access(AccessError),
    Routing(RoutingError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        ApiError::Access(e)
    }
}

impl From<RoutingError> for ApiError {
    fn from(e: RoutingError) -> Self {
        ApiError::Routing(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(e) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
            }
            ApiError::Access(e) => {
                let status = match e {
                    AccessError::InvalidKey => StatusCode::UNAUTHORIZED,
                    AccessError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                };
                (status, Json(json!({ "error": e.to_string() }))).into_response()
            }
            ApiError::Routing(e) => {
                error!("Request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error",
                        "message": e.public_message(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Parse a raw body; anything that is not JSON counts as no input
fn parse_body(body: &[u8]) -> Result<CanonicalRequest, ValidationError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ValidationError::EmptyBody)?;
    CanonicalRequest::from_body(&value)
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(State(state): State<ServerState>, body: Bytes) -> Result<Response, ApiError> {
    let request = parse_body(&body)?;
    debug!(
        "Chat completion: model={}, {} messages, stream={}",
        request.model,
        request.messages.len(),
        request.stream
    );

    let response = state.router.route(&request).await?;
    Ok(Json(response).into_response())
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

fn model_entry(id: String, owned_by: &str) -> ModelEntry {
    ModelEntry {
        id,
        object: "model",
        created: 0,
        owned_by: owned_by.to_string(),
    }
}

/// `GET /v1/models`
pub async fn list_models(State(state): State<ServerState>) -> Json<ModelList> {
    let local_name = &state.local.descriptor().name;
    let local_models = inventory_or_empty(local_name, state.local.list_models().await);

    let remote = &state.config.remote;
    let data = local_models
        .into_iter()
        .map(|id| model_entry(id, local_name))
        .chain(remote.models.iter().map(|id| model_entry(id.clone(), &remote.name)))
        .collect();

    Json(ModelList { object: "list", data })
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": crate::SERVICE_NAME,
        "version": crate::VERSION,
    }))
}

pub async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "message": format!("No route for {}", uri.path()),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::types::BackendKind;

    #[test]
    fn test_parse_body_validation_order() {
        assert_eq!(parse_body(b"").unwrap_err(), ValidationError::EmptyBody);
        assert_eq!(parse_body(b"not json").unwrap_err(), ValidationError::EmptyBody);
        assert_eq!(parse_body(b"{}").unwrap_err(), ValidationError::EmptyBody);
        assert_eq!(
            parse_body(br#"{"model":"m"}"#).unwrap_err(),
            ValidationError::MissingField("messages")
        );
        assert_eq!(
            parse_body(br#"{"messages":[]}"#).unwrap_err(),
            ValidationError::MissingField("model")
        );
        let ok = parse_body(br#"{"model":"m","messages":[{"role":"user","content":"Hi"}]}"#).unwrap();
        assert_eq!(ok.model, "m");
    }

    #[test]
    fn test_error_status_codes() {
        let validation = ApiError::from(ValidationError::EmptyBody).into_response();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let unauthorized = ApiError::from(AccessError::InvalidKey).into_response();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        let limited = ApiError::from(AccessError::RateLimited).into_response();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let routing = ApiError::from(RoutingError::AllBackendsFailed {
            attempted: vec![BackendKind::Remote],
            last_backend: BackendKind::Remote,
            last_error: BackendError::Timeout { backend: "deepseek".into(), timeout_secs: 120 },
        })
        .into_response();
        assert_eq!(routing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_routing_error_body_hides_upstream_text() {
        let response = ApiError::from(RoutingError::AllBackendsFailed {
            attempted: vec![BackendKind::Local, BackendKind::Remote],
            last_backend: BackendKind::Remote,
            last_error: BackendError::Http {
                backend: "deepseek".into(),
                status: Some(502),
                message: "<html>nginx internal-host-3</html>".into(),
            },
        })
        .into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal server error");
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("HTTP 502"));
        assert!(!message.contains("internal-host-3"));
    }
}
