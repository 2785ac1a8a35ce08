// Workflow resource spec: the step DAG.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The reserved terminal step id.
pub const END: &str = "END";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Agent,
    Tool,
    Function,
    Condition,
    Parallel,
}

/// `step.next` — a single id, a sequence of ids run sequentially, or a
/// condition-label → id map for `condition` steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextSpec {
    Single(String),
    Sequence(Vec<String>),
    Conditional(HashMap<String, String>),
}

/// A single step definition inside `Workflow.spec.steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: StepType,

    /// For `agent` steps: the alias of a bound Agent (looked up via the
    /// enclosing Workflow's dependency resolution, itself via `Network`-
    /// style alias lookup against the Runtime Manager).
    #[serde(default)]
    pub agent: Option<String>,
    /// For `tool` steps: the alias/name of a bound Tool.
    #[serde(default)]
    pub tool: Option<String>,
    /// For `function` steps: an opaque callable reference, registered by
    /// the embedding application rather than resolved from a manifest.
    #[serde(default)]
    pub function: Option<String>,
    /// For `condition` steps: a restricted expression evaluated against the
    /// template context.
    #[serde(default)]
    pub predicate: Option<String>,
    /// For `parallel` steps: the sub-steps to run concurrently.
    #[serde(default)]
    pub steps: Vec<StepDef>,

    #[serde(default)]
    pub input: HashMap<String, Value>,
    #[serde(default)]
    pub output: HashMap<String, String>,
    #[serde(default)]
    pub next: Option<NextSpec>,

    #[serde(rename = "timeout", default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(rename = "retryDelayMs", default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub cacheable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(rename = "initialStep")]
    pub initial_step: String,
    pub steps: Vec<StepDef>,
}

impl WorkflowSpec {
    pub fn step(&self, id: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.id == id)
    }
}
