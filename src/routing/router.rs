//! Local/remote router with transparent fallback

use std::sync::Arc;
use tracing::{info, warn};

use super::{Complexity, ComplexityEstimator, RouteReason, RoutingDecision};
use crate::backend::{ChatBackend, LocalBackend, ModelProbe, RemoteBackend};
use crate::config::Config;
use crate::error::RoutingError;
use crate::types::{BackendKind, CanonicalRequest, CanonicalResponse};

/// Chooses a backend per request and invokes it.
///
/// Holds no per-request state, so one instance is shared by every request task.
pub struct Router {
    local: Arc<dyn ChatBackend>,
    remote: Arc<dyn ChatBackend>,
    probe: Arc<dyn ModelProbe>,
    estimator: ComplexityEstimator,
    remote_tokens: Vec<String>,
}

impl Router {
    pub fn new(
        local: Arc<dyn ChatBackend>,
        remote: Arc<dyn ChatBackend>,
        probe: Arc<dyn ModelProbe>,
        estimator: ComplexityEstimator,
        remote_tokens: Vec<String>,
    ) -> Self {
        Self {
            local,
            remote,
            probe,
            estimator,
            remote_tokens: remote_tokens.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Build the router from configuration; the local backend doubles as the probe
    /// and is shared with other callers
    pub fn with_local(config: &Config, local: Arc<LocalBackend>) -> Self {
        let remote = Arc::new(RemoteBackend::new(
            config.remote_descriptor(),
            &config.remote.default_model,
            config.remote.variants.clone(),
        ));

        Self::new(
            local.clone(),
            remote,
            local,
            ComplexityEstimator::new(config.routing.complexity_threshold),
            config.routing.remote_tokens.clone(),
        )
    }

    /// True if the model name asks for the remote backend explicitly
    pub fn is_remote_model(&self, model: &str) -> bool {
        let lower = model.to_lowercase();
        self.remote_tokens.iter().any(|token| lower.contains(token.as_str()))
    }

    /// Pick a backend; first matching rule wins
    pub async fn decide(&self, request: &CanonicalRequest) -> RoutingDecision {
        if self.is_remote_model(&request.model) {
            return RoutingDecision::new(BackendKind::Remote, RouteReason::ExplicitRemoteModel);
        }

        if self.estimator.estimate(&request.messages) == Complexity::Complex {
            return RoutingDecision::new(BackendKind::Remote, RouteReason::ComplexityThresholdExceeded);
        }

        if self.probe.is_available(&request.model).await {
            RoutingDecision::new(BackendKind::Local, RouteReason::LocalModelAvailable)
        } else {
            RoutingDecision::new(BackendKind::Remote, RouteReason::LocalUnavailableFallback)
        }
    }

    /// Route a request to exactly one terminal response or error
    pub async fn route(&self, request: &CanonicalRequest) -> Result<CanonicalResponse, RoutingError> {
        let decision = self.decide(request).await;
        info!(
            model = %request.model,
            backend = %decision.chosen_backend,
            reason = %decision.reason,
            "Routing request"
        );

        let mut attempted = Vec::with_capacity(2);

        if decision.chosen_backend == BackendKind::Local {
            attempted.push(BackendKind::Local);
            match self.local.invoke(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let fallback = RoutingDecision::new(BackendKind::Remote, RouteReason::LocalCallFailedFallback);
                    warn!(
                        model = %request.model,
                        error_kind = ?e.kind(),
                        reason = %fallback.reason,
                        "Local backend failed, retrying on remote: {}",
                        e
                    );
                }
            }
        }

        attempted.push(BackendKind::Remote);
        self.remote
            .invoke(request)
            .await
            .map_err(|last_error| {
                warn!(model = %request.model, "Remote backend failed: {}", last_error);
                RoutingError::AllBackendsFailed {
                    attempted,
                    last_backend: BackendKind::Remote,
                    last_error,
                }
            })
    }
}
