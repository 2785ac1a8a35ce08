// Agent resource spec.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `model.provider/name` pair identifying which LLM capability backs an
/// agent. The actual client is an external collaborator — this crate only
/// carries the reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub name: String,
    /// Optional reference to a reconciled `Llm` resource by name, overriding
    /// the `provider`/`name` defaults with shared configuration.
    #[serde(rename = "llmRef", skip_serializing_if = "Option::is_none")]
    pub llm_ref: Option<String>,
}

/// An alias → Tool reference entry in `Agent.spec.tools`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBinding {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "lastMessages", default)]
    pub last_messages: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub instructions: String,
    pub model: ModelRef,
    #[serde(default)]
    pub tools: HashMap<String, ToolBinding>,
    #[serde(default)]
    pub memory: Option<MemoryConfig>,
    #[serde(default)]
    pub voice: Option<VoiceConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_with_tools() {
        let yaml = r#"
instructions: "Do math"
model:
  provider: openai
  name: gpt-4
tools:
  calc:
    ref: Tool/calculator
"#;
        let spec: AgentSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.model.provider, "openai");
        assert_eq!(spec.tools["calc"].reference, "Tool/calculator");
    }
}
