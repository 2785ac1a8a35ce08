//! The abstract callable boundary a `Tool` resource's `execute.ref` points
//! at. Like [`crate::agent_capability`], the core never interprets or
//! sandboxes the reference string — it only looks the name up in a
//! registry the embedder populates.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait ToolCapability: Send + Sync {
    async fn call(&self, params: &Value) -> Result<Value>;
}

/// Maps `execute.ref` names to their registered callable. Not a `Resource`
/// itself — populated directly by the embedding application before any
/// Tool using that name is invoked.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    entries: std::sync::Arc<dashmap::DashMap<String, std::sync::Arc<dyn ToolCapability>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, reference: impl Into<String>, capability: std::sync::Arc<dyn ToolCapability>) {
        self.entries.insert(reference.into(), capability);
    }

    pub fn get(&self, reference: &str) -> Option<std::sync::Arc<dyn ToolCapability>> {
        self.entries.get(reference).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double;

    #[async_trait]
    impl ToolCapability for Double {
        async fn call(&self, params: &Value) -> Result<Value> {
            let n = params.get("n").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(serde_json::json!({ "result": n * 2.0 }))
        }
    }

    #[tokio::test]
    async fn registered_callable_is_invoked_by_reference() {
        let registry = ToolRegistry::new();
        registry.register("builtin.double", std::sync::Arc::new(Double));
        let capability = registry.get("builtin.double").unwrap();
        let result = capability.call(&serde_json::json!({"n": 21})).await.unwrap();
        assert_eq!(result["result"], 42.0);
    }

    #[test]
    fn unregistered_reference_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry.get("missing").is_none());
    }
}
