use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub step: u32,
    pub agent_id: Option<String>,
    pub input: Value,
    pub output: Value,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub latency_ms: i64,
    pub is_router_call: bool,
    pub state_changes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub total_calls: usize,
    pub router_calls: usize,
    pub agent_calls: HashMap<String, usize>,
    pub avg_latency_ms: f64,
    pub max_latency_ms: i64,
    pub min_latency_ms: i64,
}

pub fn summarize(trace: &[TraceRecord]) -> TraceSummary {
    if trace.is_empty() {
        return TraceSummary::default();
    }
    let mut summary = TraceSummary { total_calls: trace.len(), ..Default::default() };
    let mut total_latency = 0i64;
    summary.max_latency_ms = i64::MIN;
    summary.min_latency_ms = i64::MAX;
    for record in trace {
        if record.is_router_call {
            summary.router_calls += 1;
        } else if let Some(agent) = &record.agent_id {
            *summary.agent_calls.entry(agent.clone()).or_insert(0) += 1;
        }
        total_latency += record.latency_ms;
        summary.max_latency_ms = summary.max_latency_ms.max(record.latency_ms);
        summary.min_latency_ms = summary.min_latency_ms.min(record.latency_ms);
    }
    summary.avg_latency_ms = total_latency as f64 / trace.len() as f64;
    summary
}

/// The outcome of one [`super::NetworkExecutor::generate`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkExecuteResult {
    pub answer: String,
    pub steps: u32,
    pub trace: Option<Vec<TraceRecord>>,
    pub trace_summary: Option<TraceSummary>,
}
