//! OpenAI-compatible HTTP gateway

pub mod auth;
pub mod http;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::access::{AccessGate, GatewayAccess};
use crate::backend::LocalBackend;
use crate::config::Config;
use crate::routing::Router as RequestRouter;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub router: Arc<RequestRouter>,
    /// Also held by the router; used directly for model listings
    pub local: Arc<LocalBackend>,
    pub gate: Arc<dyn AccessGate>,
}

impl ServerState {
    pub fn new(
        config: Config,
        router: Arc<RequestRouter>,
        local: Arc<LocalBackend>,
        gate: Arc<dyn AccessGate>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            router,
            local,
            gate,
        }
    }

    /// Wire backends, router and access gate from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let local = Arc::new(LocalBackend::new(
            config.local_descriptor(),
            Duration::from_secs(config.local.probe_timeout_secs),
        ));
        let router = Arc::new(RequestRouter::with_local(&config, local.clone()));
        let gate = GatewayAccess::from_config(&config)
            .context("Failed to initialize access control")?
            .into_shared();
        Ok(Self::new(config, router, local, gate))
    }
}

/// Build the application router
pub fn app(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Inference requires a key and counts against the rate limit
    let protected = Router::new()
        .route("/v1/chat/completions", post(http::chat_completions))
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            auth::access_middleware,
        ));

    let public = Router::new()
        .route("/v1/models", get(http::list_models))
        .route("/health", get(http::health));

    Router::new()
        .merge(protected)
        .merge(public)
        .fallback(http::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway and serve until Ctrl-C
pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let state = ServerState::from_config(config)?;
    let local_url = state.config.local.base_url.clone();
    let remote_url = state.config.remote.base_url.clone();
    let remote_key_set = state.config.remote.api_key.is_some();
    let prune_every = Duration::from_secs(state.config.access.rate_limit_window_secs.max(1));
    let gate = state.gate.clone();
    let app = app(state);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Inference Gateway Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Local backend:  {}", local_url);
    println!("✓ Remote backend: {}", remote_url);
    if !remote_key_set {
        println!("⚠ Remote API key not set; remote calls will be rejected upstream");
    }
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Gateway listening on {}", addr);

    let pruning = spawn_idle_pruning(gate, prune_every);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");
    pruning.abort();
    served?;

    info!("Gateway stopped");
    Ok(())
}

/// Periodically drop rate-limit state for callers that went quiet
fn spawn_idle_pruning(gate: Arc<dyn AccessGate>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            gate.prune_idle();
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
