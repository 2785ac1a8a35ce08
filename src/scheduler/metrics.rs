use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

const LATENCY_WINDOW: usize = 1000;
const THROUGHPUT_WINDOW: std::time::Duration = std::time::Duration::from_secs(60);

struct Inner {
    total_submitted: u64,
    total_completed: u64,
    total_failed: u64,
    total_timeout: u64,
    total_cancelled: u64,
    per_type: HashMap<String, u64>,
    latencies_ms: VecDeque<u64>,
    completions: VecDeque<Instant>,
}

pub struct TaskMetrics {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_submitted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_timeout: u64,
    pub total_cancelled: u64,
    pub per_type: HashMap<String, u64>,
    pub p50_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub throughput_last_60s: u64,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                total_submitted: 0,
                total_completed: 0,
                total_failed: 0,
                total_timeout: 0,
                total_cancelled: 0,
                per_type: HashMap::new(),
                latencies_ms: VecDeque::with_capacity(LATENCY_WINDOW),
                completions: VecDeque::new(),
            }),
        }
    }

    pub fn record_submitted(&self, task_type: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_submitted += 1;
        *inner.per_type.entry(task_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_completed(&self, _task_type: &str, latency_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_completed += 1;
        push_latency(&mut inner.latencies_ms, latency_ms);
        push_completion(&mut inner.completions);
    }

    pub fn record_failed(&self, _task_type: &str, latency_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_failed += 1;
        push_latency(&mut inner.latencies_ms, latency_ms);
    }

    pub fn record_timeout(&self, _task_type: &str, latency_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_timeout += 1;
        push_latency(&mut inner.latencies_ms, latency_ms);
    }

    pub fn record_cancelled(&self) {
        self.inner.lock().unwrap().total_cancelled += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut inner = self.inner.lock().unwrap();
        prune_completions(&mut inner.completions);
        let mut sorted: Vec<u64> = inner.latencies_ms.iter().copied().collect();
        sorted.sort_unstable();
        MetricsSnapshot {
            total_submitted: inner.total_submitted,
            total_completed: inner.total_completed,
            total_failed: inner.total_failed,
            total_timeout: inner.total_timeout,
            total_cancelled: inner.total_cancelled,
            per_type: inner.per_type.clone(),
            p50_latency_ms: percentile(&sorted, 0.50),
            p99_latency_ms: percentile(&sorted, 0.99),
            throughput_last_60s: inner.completions.len() as u64,
        }
    }
}

fn push_latency(window: &mut VecDeque<u64>, latency_ms: u64) {
    if window.len() == LATENCY_WINDOW {
        window.pop_front();
    }
    window.push_back(latency_ms);
}

fn push_completion(completions: &mut VecDeque<Instant>) {
    prune_completions(completions);
    completions.push_back(Instant::now());
}

fn prune_completions(completions: &mut VecDeque<Instant>) {
    let now = Instant::now();
    while let Some(front) = completions.front() {
        if now.duration_since(*front) > THROUGHPUT_WINDOW {
            completions.pop_front();
        } else {
            break;
        }
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p50_and_p99_over_known_distribution() {
        let metrics = TaskMetrics::new();
        for ms in 1..=100u64 {
            metrics.record_completed("test", ms);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.p50_latency_ms, 50);
        assert_eq!(snap.p99_latency_ms, 99);
        assert_eq!(snap.total_completed, 100);
    }

    #[test]
    fn latency_window_caps_at_1000_samples() {
        let metrics = TaskMetrics::new();
        for ms in 0..1500u64 {
            metrics.record_completed("test", ms);
        }
        let snap = metrics.snapshot();
        // the oldest 500 samples (0..500) should have been evicted
        assert!(snap.p50_latency_ms >= 500);
    }
}
