//! Access control for the HTTP surface
//!
//! The gateway only needs two answers per request: is this key allowed, and
//! may this caller make another request right now. [`GatewayAccess`] answers
//! both from the configured keys, the persisted key store, and a sliding-window
//! rate limiter.

pub mod keys;
pub mod rate_limit;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;

pub use keys::{KeyRecord, KeyStats, KeyStore};
pub use rate_limit::RateLimiter;

/// Identity used for callers that present no credential
pub const ANONYMOUS: &str = "anonymous";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessGate: Send + Sync {
    /// True if `key` is a currently active credential
    async fn is_key_active(&self, key: &str) -> bool;

    /// Count one request for `identity`; false once its limit is reached
    async fn check_and_consume_rate_limit(&self, identity: &str) -> bool;

    /// Forget callers with no requests left in the current window
    fn prune_idle(&self);
}

/// Access gate backed by configuration and the key store
pub struct GatewayAccess {
    admin_key: Option<String>,
    static_keys: Vec<String>,
    store: Option<Arc<KeyStore>>,
    limiter: RateLimiter,
}

impl GatewayAccess {
    pub fn new(
        admin_key: Option<String>,
        static_keys: Vec<String>,
        store: Option<KeyStore>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            admin_key: admin_key.filter(|k| !k.is_empty()),
            static_keys: static_keys.into_iter().filter(|k| !k.is_empty()).collect(),
            store: store.map(Arc::new),
            limiter,
        }
    }

    /// Build from configuration, opening the key store at its configured path
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = KeyStore::open(config.keys_file()?)?;
        let limiter = RateLimiter::new(
            config.access.rate_limit_requests,
            Duration::from_secs(config.access.rate_limit_window_secs),
        );
        Ok(Self::new(
            config.access.admin_key.clone(),
            config.access.api_keys.clone(),
            Some(store),
            limiter,
        ))
    }

    pub fn into_shared(self) -> Arc<dyn AccessGate> {
        Arc::new(self)
    }

    fn is_configured_key(&self, key: &str) -> bool {
        self.admin_key.as_deref() == Some(key) || self.static_keys.iter().any(|k| k == key)
    }
}

#[async_trait]
impl AccessGate for GatewayAccess {
    async fn is_key_active(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        if self.is_configured_key(key) {
            return true;
        }
        self.store.as_ref().is_some_and(|s| s.active_record(key).is_some())
    }

    async fn check_and_consume_rate_limit(&self, identity: &str) -> bool {
        let stored = if identity == ANONYMOUS || self.is_configured_key(identity) {
            None
        } else {
            self.store.as_ref().and_then(|s| s.active_record(identity))
        };

        if !self.limiter.check(identity, stored.as_ref().map(|r| r.rate_limit)) {
            return false;
        }

        if let (Some(store), Some(_)) = (&self.store, &stored) {
            let store = Arc::clone(store);
            let key = identity.to_string();
            match tokio::task::spawn_blocking(move || store.record_request(&key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to record key usage: {:#}", e),
                Err(e) => warn!("Key usage task failed: {}", e),
            }
        }
        true
    }

    fn prune_idle(&self) {
        self.limiter.prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with_store(limit: u32) -> (tempfile::TempDir, GatewayAccess, String) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path().join("api_keys.json")).unwrap();
        let created = store.create("ci", "", 2).unwrap();
        let gate = GatewayAccess::new(
            Some("admin-secret".into()),
            vec!["static-key".into()],
            Some(store),
            RateLimiter::new(limit, Duration::from_secs(60)),
        );
        (dir, gate, created.key)
    }

    #[tokio::test]
    async fn test_key_sources() {
        let (_dir, gate, stored) = gate_with_store(100);
        assert!(gate.is_key_active("admin-secret").await);
        assert!(gate.is_key_active("static-key").await);
        assert!(gate.is_key_active(&stored).await);
        assert!(!gate.is_key_active("").await);
        assert!(!gate.is_key_active("sk-gw-unknown").await);
        assert!(!gate.is_key_active(&stored[..10]).await);
    }

    #[tokio::test]
    async fn test_deactivated_key_rejected() {
        let (_dir, gate, stored) = gate_with_store(100);
        gate.store.as_ref().unwrap().deactivate(&stored).unwrap();
        assert!(!gate.is_key_active(&stored).await);
    }

    #[tokio::test]
    async fn test_stored_key_uses_its_own_limit_and_counts_usage() {
        let (_dir, gate, stored) = gate_with_store(100);
        assert!(gate.check_and_consume_rate_limit(&stored).await);
        assert!(gate.check_and_consume_rate_limit(&stored).await);
        assert!(!gate.check_and_consume_rate_limit(&stored).await);
        assert_eq!(gate.store.as_ref().unwrap().stats().total_requests, 2);
    }

    #[tokio::test]
    async fn test_anonymous_uses_default_limit() {
        let (_dir, gate, _) = gate_with_store(3);
        for _ in 0..3 {
            assert!(gate.check_and_consume_rate_limit(ANONYMOUS).await);
        }
        assert!(!gate.check_and_consume_rate_limit(ANONYMOUS).await);
    }

    #[tokio::test]
    async fn test_prune_idle_forgets_expired_callers() {
        let gate = GatewayAccess::new(None, vec![], None, RateLimiter::new(1, Duration::from_millis(1)));
        assert!(gate.check_and_consume_rate_limit(ANONYMOUS).await);
        tokio::time::sleep(Duration::from_millis(5)).await;
        gate.prune_idle();
        assert!(gate.limiter.is_empty());
    }

    #[tokio::test]
    async fn test_empty_configured_keys_ignored() {
        let gate = GatewayAccess::new(
            Some(String::new()),
            vec![String::new()],
            None,
            RateLimiter::new(1, Duration::from_secs(60)),
        );
        assert!(!gate.is_key_active("").await);
        assert!(!gate.is_key_active("anything").await);
    }
}
