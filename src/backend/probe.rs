//! Local model availability
//!
//! Absence of a local model is always a safe answer because the remote backend
//! can serve any request, so every failure here resolves to "not available".

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{LocalBackend, ModelProbe};
use crate::error::BackendError;

/// True iff `model` is contained in at least one inventory entry (case-sensitive)
pub fn inventory_contains(inventory: &[String], model: &str) -> bool {
    inventory.iter().any(|name| name.contains(model))
}

/// Substitute an empty inventory when the backend could not be listed.
///
/// The failure is logged with its classification rather than propagated.
pub fn inventory_or_empty(backend: &str, result: Result<Vec<String>, BackendError>) -> Vec<String> {
    match result {
        Ok(models) => models,
        Err(e) => {
            warn!(
                "Model inventory from {} unavailable ({:?}), using empty list: {}",
                backend,
                e.kind(),
                e
            );
            Vec::new()
        }
    }
}

#[async_trait]
impl ModelProbe for LocalBackend {
    async fn is_available(&self, model: &str) -> bool {
        match self.list_models().await {
            Ok(inventory) => inventory_contains(&inventory, model),
            Err(e) => {
                debug!("Availability probe for {} failed: {}", model, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Vec<String> {
        vec!["qwen2.5:7b".to_string(), "llama3.1:8b-instruct".to_string()]
    }

    #[test]
    fn test_substring_containment() {
        let inv = inventory();
        assert!(inventory_contains(&inv, "qwen2.5:7b"));
        assert!(inventory_contains(&inv, "qwen2.5"));
        assert!(inventory_contains(&inv, "llama3.1"));
        assert!(!inventory_contains(&inv, "Qwen2.5"));
        assert!(!inventory_contains(&inv, "mistral"));
        assert!(!inventory_contains(&[], "qwen2.5"));
    }

    #[test]
    fn test_inventory_or_empty() {
        assert_eq!(inventory_or_empty("ollama", Ok(inventory())), inventory());
        let err = BackendError::Timeout { backend: "ollama".into(), timeout_secs: 5 };
        assert!(inventory_or_empty("ollama", Err(err)).is_empty());
    }
}
