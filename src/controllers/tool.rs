use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::models::{Resource, ToolSpec};
use crate::store::StateStore;

use super::base::Controller;

/// Tools have no runtime side effects of their own — reconciling one just
/// validates its shape and marks the spec's generation observed.
#[derive(Default)]
pub struct ToolController;

#[async_trait]
impl Controller for ToolController {
    fn kind(&self) -> &'static str {
        "Tool"
    }

    async fn validate(&self, resource: &Resource) -> Result<()> {
        serde_json::from_value::<ToolSpec>(resource.spec.clone())
            .map(|_| ())
            .map_err(|e| crate::error::Error::ValidationFailed(e.to_string()))
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
    async fn rejects_tool_missing_execute() {
        let controller = ToolController;
        let resource = Resource::new(
            "mastra/v1",
            Kind::Tool,
            ObjectMeta::new("broken"),
            json!({"id": "broken", "description": "x"}),
        );
        assert!(controller.validate(&resource).await.is_err());
    }

    #[tokio::test]
    async fn accepts_well_formed_tool() {
        let controller = ToolController;
        let resource = Resource::new(
            "mastra/v1",
            Kind::Tool,
            ObjectMeta::new("calc"),
            json!({"id": "calc", "description": "adds numbers", "execute": {"ref": "builtin.add"}}),
        );
        assert!(controller.validate(&resource).await.is_ok());
    }
}
