use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Timeout,
}

/// One attempt at one step (or sub-step, dotted under its parallel parent's
/// id) — a workflow run accumulates these in execution order regardless of
/// how the DAG branched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub step_id: String,
    pub attempt: u32,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub from_cache: bool,
}

/// `Timeout` is part of the declared status vocabulary but is not currently
/// produced by `WorkflowExecutor`: a step timeout aborts the run with
/// `Failed` (the step's own [`StepExecutionRecord`] is what carries
/// `status=timeout`). Reserved for a future workflow-level deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Timeout,
}

/// The terminal outcome of a single [`super::WorkflowExecutor::run`] call.
/// Never an `Err` — failures inside the DAG are folded in here instead of
/// propagated, so a caller always gets a result to inspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecuteResult {
    pub status: ExecutionStatus,
    pub history: Vec<StepExecutionRecord>,
    pub output: Value,
    pub error: Option<String>,
}

impl WorkflowExecuteResult {
    pub fn completed(history: Vec<StepExecutionRecord>, output: Value) -> Self {
        Self { status: ExecutionStatus::Completed, history, output, error: None }
    }

    pub fn failed(history: Vec<StepExecutionRecord>, output: Value, error: impl Into<String>) -> Self {
        Self { status: ExecutionStatus::Failed, history, output, error: Some(error.into()) }
    }
}
