use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{AgentSpec, Resource};
use crate::store::StateStore;

use super::base::Controller;

#[derive(Default)]
pub struct AgentController;

#[async_trait]
impl Controller for AgentController {
    fn kind(&self) -> &'static str {
        "Agent"
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        serde_json::from_value::<AgentSpec>(resource.spec.clone())
            .map(|_| ())
            .map_err(|e| Error::ValidationFailed(e.to_string()))
    }

    async fn resolve_dependencies(&self, resource: &Resource, store: &dyn StateStore) -> Result<()> {
        let spec: AgentSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        let namespace = &resource.metadata.namespace;

        for (alias, binding) in &spec.tools {
            let (kind, name) = split_reference(&binding.reference)
                .ok_or_else(|| Error::DependencyResolutionFailed(format!("tool alias {alias}: malformed reference {}", binding.reference)))?;
            if store.get(kind, namespace, name).await?.is_none() {
                return Err(Error::DependencyResolutionFailed(format!("tool alias {alias} references missing {kind}/{name}")));
            }
        }

        if let Some(llm_ref) = &spec.model.llm_ref {
            if store.get("Llm", namespace, llm_ref).await?.is_none() {
                return Err(Error::DependencyResolutionFailed(format!("model.llmRef references missing Llm/{llm_ref}")));
            }
        }
        Ok(())
    }

    async fn desired_state(&self, resource: &Resource) -> Result<Value> {
        Ok(json!({ "generation": resource.metadata.generation }))
    }

    async fn current_state(&self, resource: &Resource) -> Result<Value> {
        Ok(json!({ "generation": resource.status.as_ref().and_then(|s| s.observed_generation) }))
    }

    async fn update_state(&self, _resource: &Resource, _desired: &Value, _current: &Value) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self, _resource: &Resource) -> Result<()> {
        Ok(())
    }
}

fn split_reference(reference: &str) -> Option<(&str, &str)> {
    reference.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kind, ObjectMeta};
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn dependency_resolution_fails_on_missing_tool() {
        let store = MemoryStore::new();
        let controller = AgentController;
        let resource = Resource::new(
            "mastra/v1",
            Kind::Agent,
            ObjectMeta::new("math-agent"),
            json!({
                "instructions": "Do math",
                "model": {"provider": "openai", "name": "gpt-4"},
                "tools": {"calc": {"ref": "Tool/calculator"}}
            }),
        );
        let err = controller.resolve_dependencies(&resource, &store).await.unwrap_err();
        assert!(matches!(err, Error::DependencyResolutionFailed(_)));
    }

    #[tokio::test]
    async fn dependency_resolution_succeeds_when_tool_exists() {
        let store = MemoryStore::new();
        store
            .save(Resource::new(
                "mastra/v1",
                Kind::Tool,
                ObjectMeta::new("calculator"),
                json!({"id": "calculator", "execute": {"ref": "builtin.add"}}),
            ))
            .await
            .unwrap();

        let controller = AgentController;
        let resource = Resource::new(
            "mastra/v1",
            Kind::Agent,
            ObjectMeta::new("math-agent"),
            json!({
                "instructions": "Do math",
                "model": {"provider": "openai", "name": "gpt-4"},
                "tools": {"calc": {"ref": "Tool/calculator"}}
            }),
        );
        controller.resolve_dependencies(&resource, &store).await.unwrap();
    }
}
