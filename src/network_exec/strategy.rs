// Routing strategies: which agent gets consulted next. `Default` leaves the
// decision to the router capability's own reasoning; the rest compute it
// algorithmically from the agent roster and per-agent call history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::models::AgentEntry;

/// A caller-supplied selector for the `Custom` strategy.
pub trait CustomSelector: Send + Sync {
    fn select(&self, agents: &[AgentEntry], message: &str, state: &HashMap<String, serde_json::Value>) -> Option<String>;
}

#[derive(Clone)]
pub enum RoutingStrategy {
    Default,
    RoundRobin,
    HistoryBased,
    SemanticMatching,
    Custom(Arc<dyn CustomSelector>),
}

#[derive(Default, Clone, Copy)]
struct AgentStat {
    calls: u32,
    failures: u32,
    total_latency_ms: i64,
}

impl AgentStat {
    /// Higher is better: a mix of success rate and inverse latency. Agents
    /// with no history yet score 0 so a fresh roster falls back to
    /// declaration order.
    fn score(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        let success_rate = (self.calls - self.failures) as f64 / self.calls as f64;
        let avg_latency = (self.total_latency_ms as f64 / self.calls as f64).max(1.0);
        success_rate / avg_latency
    }
}

/// Tracks round-robin position and per-agent call history across an
/// executor's lifetime — unlike a workflow run's cache, this is meant to
/// persist between `generate` calls on the same network.
#[derive(Default)]
pub struct RoutingState {
    round_robin: AtomicUsize,
    stats: Mutex<HashMap<String, AgentStat>>,
}

impl RoutingState {
    pub fn record_call(&self, alias: &str, latency_ms: i64, failed: bool) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats.entry(alias.to_string()).or_default();
        entry.calls += 1;
        entry.total_latency_ms += latency_ms;
        if failed {
            entry.failures += 1;
        }
    }

    fn agent_score(&self, alias: &str) -> f64 {
        self.stats.lock().unwrap().get(alias).map(|s| s.score()).unwrap_or(0.0)
    }

    pub fn select(&self, strategy: &RoutingStrategy, agents: &[AgentEntry], message: &str, state: &HashMap<String, serde_json::Value>) -> Option<String> {
        if agents.is_empty() {
            return None;
        }
        match strategy {
            RoutingStrategy::Default => None,
            RoutingStrategy::RoundRobin => {
                let idx = self.round_robin.fetch_add(1, Ordering::SeqCst) % agents.len();
                Some(agents[idx].name.clone())
            }
            RoutingStrategy::HistoryBased => {
                let mut best: Option<(&str, f64)> = None;
                for agent in agents {
                    let score = self.agent_score(&agent.name);
                    if best.map(|(_, b)| score > b).unwrap_or(true) {
                        best = Some((&agent.name, score));
                    }
                }
                best.map(|(name, _)| name.to_string())
            }
            RoutingStrategy::SemanticMatching => {
                let input_tokens = tokenize(message);
                let mut best: Option<(&str, f64)> = None;
                for agent in agents {
                    let specialty_tokens = agent.specialties.iter().flat_map(|s| tokenize(s)).collect::<Vec<_>>();
                    let overlap = input_tokens.iter().filter(|t| specialty_tokens.contains(t)).count() as f64;
                    let agent_score = 1.0 + self.agent_score(&agent.name);
                    let score = overlap * agent_score;
                    if best.map(|(_, b)| score > b).unwrap_or(true) {
                        best = Some((&agent.name, score));
                    }
                }
                best.map(|(name, _)| name.to_string())
            }
            RoutingStrategy::Custom(selector) => selector.select(agents, message, state),
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(|t| t.to_string()).collect()
}
