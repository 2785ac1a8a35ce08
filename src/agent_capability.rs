//! The abstract text-generation boundary an `Agent` resource calls through.
//! The core never talks to a language-model API directly — it calls
//! whatever implementation of this trait the embedding application
//! registered for a given agent.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A single turn's output from an [`AgentCapability`].
#[derive(Debug, Clone)]
pub struct GenerateResult {
    /// Raw structured output as the capability returned it — may carry
    /// `text`, `content`, `choices[0].message.content`, tool calls, etc.
    pub raw: Value,
}

impl GenerateResult {
    pub fn text(raw: impl Into<Value>) -> Self {
        Self { raw: raw.into() }
    }

    /// Extract plain text the way the workflow/network executors do: first
    /// of `text`, `content`, `choices[0].message.content`, or the raw value
    /// itself if it's already a string.
    pub fn extract_text(&self) -> String {
        if let Some(s) = self.raw.get("text").and_then(Value::as_str) {
            return s.to_string();
        }
        if let Some(s) = self.raw.get("content").and_then(Value::as_str) {
            return s.to_string();
        }
        if let Some(s) = self
            .raw
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
        {
            return s.to_string();
        }
        if let Some(s) = self.raw.as_str() {
            return s.to_string();
        }
        self.raw.to_string()
    }
}

/// An opaque callable producing text (or structured output) for an input —
/// the embedding application supplies the concrete implementation
/// (wrapping whatever LLM client it uses) and registers it against an
/// `Agent` resource's name.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn generate(&self, prompt: &str, context: &Value) -> Result<GenerateResult>;
}

/// A trivial capability useful for tests and demos: always returns a fixed
/// or input-echoing response without calling out anywhere.
pub struct EchoCapability;

#[async_trait]
impl AgentCapability for EchoCapability {
    async fn generate(&self, prompt: &str, _context: &Value) -> Result<GenerateResult> {
        Ok(GenerateResult::text(Value::String(format!("echo: {prompt}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_choices_shape() {
        let result = GenerateResult {
            raw: serde_json::json!({"choices": [{"message": {"content": "42"}}]}),
        };
        assert_eq!(result.extract_text(), "42");
    }

    #[tokio::test]
    async fn echo_capability_wraps_prompt() {
        let capability = EchoCapability;
        let result = capability.generate("2+2", &Value::Null).await.unwrap();
        assert_eq!(result.extract_text(), "echo: 2+2");
    }
}
