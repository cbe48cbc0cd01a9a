//! API key authentication and rate limiting for protected routes
//!
//! Keys are read from `Authorization: Bearer <key>` first, then from the
//! `api_key` query parameter. A query string that cannot be parsed counts as
//! no key at all.

use axum::{
    extract::{rejection::QueryRejection, Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::access::AccessGate;
use crate::error::AccessError;
use crate::server::http::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Extract the presented key, if any
pub fn presented_key(headers: &HeaderMap, query: &KeyQuery) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|key| key.trim().to_string())
        .or_else(|| query.api_key.clone())
        .filter(|key| !key.is_empty())
}

/// Reject requests without an active key, then apply the caller's rate limit
pub async fn access_middleware(
    State(gate): State<Arc<dyn AccessGate>>,
    query: Result<Query<KeyQuery>, QueryRejection>,
    request: Request,
    next: Next,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            debug!("Ignoring unparseable query string: {}", rejection.body_text());
            KeyQuery::default()
        }
    };

    let key = match presented_key(request.headers(), &query) {
        Some(key) => key,
        None => return ApiError::from(AccessError::InvalidKey).into_response(),
    };

    if !gate.is_key_active(&key).await {
        debug!("Rejected request with unknown or inactive key");
        return ApiError::from(AccessError::InvalidKey).into_response();
    }

    if !gate.check_and_consume_rate_limit(&key).await {
        return ApiError::from(AccessError::RateLimited).into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::MockAccessGate;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(gate: MockAccessGate) -> Router {
        let gate: Arc<dyn AccessGate> = Arc::new(gate);
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(gate, access_middleware))
    }

    fn get_request(uri: &str, bearer: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(key) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        let query = KeyQuery { api_key: Some("from-query".into()) };
        assert_eq!(presented_key(&headers, &query).as_deref(), Some("from-query"));

        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(presented_key(&headers, &query).as_deref(), Some("from-header"));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(presented_key(&headers, &KeyQuery::default()), None);
    }

    #[tokio::test]
    async fn test_missing_key_is_401_without_consulting_gate() {
        let mut gate = MockAccessGate::new();
        gate.expect_is_key_active().never();
        gate.expect_check_and_consume_rate_limit().never();

        let response = app(gate).oneshot(get_request("/protected", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_inactive_key_is_401() {
        let mut gate = MockAccessGate::new();
        gate.expect_is_key_active().returning(|_| false);
        gate.expect_check_and_consume_rate_limit().never();

        let response = app(gate).oneshot(get_request("/protected", Some("bad"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rate_limited_key_is_429() {
        let mut gate = MockAccessGate::new();
        gate.expect_is_key_active().returning(|_| true);
        gate.expect_check_and_consume_rate_limit()
            .withf(|identity| identity == "good")
            .returning(|_| false);

        let response = app(gate).oneshot(get_request("/protected", Some("good"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_query_key_passes_through() {
        let mut gate = MockAccessGate::new();
        gate.expect_is_key_active().withf(|key| key == "qk").returning(|_| true);
        gate.expect_check_and_consume_rate_limit().returning(|_| true);

        let response = app(gate).oneshot(get_request("/protected?api_key=qk", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unparseable_query_is_json_401() {
        let mut gate = MockAccessGate::new();
        gate.expect_is_key_active().never();

        let response = app(gate)
            .oneshot(get_request("/protected?api_key=a&api_key=b", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn test_unparseable_query_still_accepts_bearer() {
        let mut gate = MockAccessGate::new();
        gate.expect_is_key_active().withf(|key| key == "good").returning(|_| true);
        gate.expect_check_and_consume_rate_limit().returning(|_| true);

        let response = app(gate)
            .oneshot(get_request("/protected?api_key=a&api_key=b", Some("good")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
