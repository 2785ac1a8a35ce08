// Llm resource spec: the minimal shape an Agent's `model.llmRef` needs to
// resolve against a shared, reconciled model configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSpec {
    pub provider: String,
    pub model: String,
    #[serde(rename = "defaultConfig", default)]
    pub default_config: Value,
}
