use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::models::{LlmSpec, Resource};
use crate::store::StateStore;

use super::base::Controller;

#[derive(Default)]
pub struct LlmController;

#[async_trait]
impl Controller for LlmController {
    fn kind(&self) -> &'static str {
        "Llm"
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        let spec: LlmSpec = serde_json::from_value(resource.spec.clone()).map_err(|e| Error::ValidationFailed(e.to_string()))?;
        if spec.provider.trim().is_empty() || spec.model.trim().is_empty() {
            return Err(Error::ValidationFailed("llm spec requires non-empty provider and model".to_string()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kind, ObjectMeta};

    #[tokio::test]
    async fn rejects_empty_provider() {
        let controller = LlmController;
        let resource = Resource::new(
            "mastra/v1",
            Kind::Llm,
            ObjectMeta::new("gpt"),
            json!({"provider": "", "model": "gpt-4"}),
        );
        assert!(controller.validate(&resource).await.is_err());
    }
}
