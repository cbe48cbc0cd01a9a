//! Operator commands: key management, usage stats and a deployment health check.
//!
//! Every command produces a `{"status": "ok" | "error", ...}` JSON document so
//! the CLI can print results uniformly.

use anyhow::Result;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::access::KeyStore;
use crate::config::Config;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Component states reported by [`health_check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Ok,
    Error,
    Offline,
}

impl CheckState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Ok => "OK",
            CheckState::Error => "ERROR",
            CheckState::Offline => "OFFLINE",
        }
    }
}

pub fn create_key(store: &KeyStore, name: &str, description: &str, rate_limit: u32) -> Result<Value> {
    let created = store.create(name, description, rate_limit)?;
    Ok(json!({
        "status": "ok",
        "key": created.key,
        "name": created.name,
        "rate_limit": created.rate_limit,
        "message": "Store this key now, it will not be shown again",
    }))
}

pub fn list_keys(store: &KeyStore) -> Value {
    json!({ "status": "ok", "keys": store.list() })
}

pub fn deactivate_key(store: &KeyStore, prefix: &str) -> Value {
    match store.deactivate(prefix) {
        Ok(masked) => json!({ "status": "ok", "key": masked }),
        Err(e) => json!({ "status": "error", "message": e.to_string() }),
    }
}

pub fn stats(store: &KeyStore) -> Value {
    let stats = store.stats();
    json!({
        "status": "ok",
        "total_requests": stats.total_requests,
        "active_keys": stats.active_keys,
        "total_keys": stats.total_keys,
    })
}

async fn probe(client: &reqwest::Client, url: &str) -> CheckState {
    debug!("Health probe: {}", url);
    match client.get(url).timeout(HEALTH_TIMEOUT).send().await {
        Ok(resp) if resp.status().is_success() => CheckState::Ok,
        Ok(_) => CheckState::Error,
        Err(_) => CheckState::Offline,
    }
}

/// Check a running gateway at `gateway_url` and the configured local backend.
///
/// The report is `ok` only when both gateway endpoints answer successfully.
pub async fn health_check(config: &Config, gateway_url: &str) -> Value {
    let client = reqwest::Client::new();
    let gateway = gateway_url.trim_end_matches('/');
    let local = config.local_descriptor();

    let gateway_state = probe(&client, &format!("{}/health", gateway)).await;
    let models_state = probe(&client, &format!("{}/v1/models", gateway)).await;
    let local_state = probe(&client, &local.endpoint("api/tags")).await;

    let healthy = gateway_state == CheckState::Ok && models_state == CheckState::Ok;
    json!({
        "status": if healthy { "ok" } else { "error" },
        "checks": {
            "api_gateway": gateway_state.as_str(),
            "models": models_state.as_str(),
            local.name.as_str(): local_state.as_str(),
        }
    })
}

/// Default gateway URL derived from the server section
pub fn default_gateway_url(config: &Config) -> String {
    let host = match config.server.host.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}", host, config.server.port)
}
