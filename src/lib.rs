//! Inference Gateway Library
//!
//! An OpenAI-compatible chat completions gateway that routes each request to
//! either a local model server or a hosted provider:
//! - Explicit remote model names and long prompts go to the remote backend
//! - Everything else goes local when the model is installed there
//! - A failed local call is retried once on the remote backend
//! - API key access control with per-key sliding-window rate limits
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use inference_gateway::backend::LocalBackend;
//! use inference_gateway::config::Config;
//! use inference_gateway::routing::Router;
//! use inference_gateway::types::{CanonicalMessage, CanonicalRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let probe_timeout = Duration::from_secs(config.local.probe_timeout_secs);
//!     let local = Arc::new(LocalBackend::new(config.local_descriptor(), probe_timeout));
//!     let router = Router::with_local(&config, local);
//!     let request = CanonicalRequest::new("llama3", vec![CanonicalMessage::user("Hello!")]);
//!     let response = router.route(&request).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod backend;
pub mod routing;
pub mod access;
pub mod admin;
pub mod server;
pub mod cli;

use tracing_subscriber::EnvFilter;

pub use config::Config;
pub use error::{AccessError, BackendError, RoutingError, ValidationError};
pub use routing::{Router, RoutingDecision};
pub use server::{start as start_server, ServerState};
pub use types::{CanonicalMessage, CanonicalRequest, CanonicalResponse};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "inference-gateway";

/// Longest prefix of `s` with at most `max_chars` characters
pub fn truncate_safe(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a
/// subscriber is already installed.
pub fn init_tracing(logging: &config::LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        "compact" => tracing_subscriber::fmt().compact().with_env_filter(filter).try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_respects_char_boundaries() {
        assert_eq!(truncate_safe("hello", 10), "hello");
        assert_eq!(truncate_safe("hello", 3), "hel");
        assert_eq!(truncate_safe("héllo", 2), "hé");
        assert_eq!(truncate_safe("日本語", 1), "日");
        assert_eq!(truncate_safe("", 5), "");
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        let logging = config::LoggingConfig::default();
        let _ = init_tracing(&logging);
        assert!(init_tracing(&logging).is_err());
    }
}
