//! Backend selection
//!
//! Picks the local or remote backend for each request and falls back to the
//! remote backend when a local call fails.

pub mod complexity;
pub mod router;

use serde::Serialize;

use crate::types::BackendKind;

pub use complexity::{Complexity, ComplexityEstimator};
pub use router::Router;

/// Why a backend was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteReason {
    ExplicitRemoteModel,
    ComplexityThresholdExceeded,
    LocalModelAvailable,
    LocalUnavailableFallback,
    LocalCallFailedFallback,
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouteReason::ExplicitRemoteModel => "explicit-remote-model",
            RouteReason::ComplexityThresholdExceeded => "complexity-threshold-exceeded",
            RouteReason::LocalModelAvailable => "local-model-available",
            RouteReason::LocalUnavailableFallback => "local-unavailable-fallback",
            RouteReason::LocalCallFailedFallback => "local-call-failed-fallback",
        };
        f.write_str(s)
    }
}

/// The backend picked for one `route` call, kept for logging only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub chosen_backend: BackendKind,
    pub reason: RouteReason,
}

impl RoutingDecision {
    pub fn new(chosen_backend: BackendKind, reason: RouteReason) -> Self {
        Self { chosen_backend, reason }
    }
}
