// Status data model: phase, conditions, and the free-form details map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// High-level lifecycle phase of a resource. Allowed transitions are
/// enforced by [`crate::status_machine`], not by this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Initializing,
    Running,
    Degraded,
    Failed,
    Terminating,
    Unknown,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Pending
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Tri-state condition value, mirroring the Kubernetes condition model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single named condition. At most one condition of a given `type_` may
/// exist in a `Status.conditions` list at a time — see
/// [`Status::upsert_condition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

/// Full status block attached to a reconciled resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            conditions: Vec::new(),
            observed_generation: None,
            last_success_time: None,
            last_failure_time: None,
            details: HashMap::new(),
        }
    }
}

impl Status {
    /// Insert or update a condition by type. `last_transition_time` is
    /// preserved unless `status` actually changed.
    pub fn upsert_condition(
        &mut self,
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        let type_ = type_.into();
        let now = Utc::now();
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status;
            existing.reason = reason;
            existing.message = message;
            existing.last_update_time = now;
        } else {
            self.conditions.push(Condition {
                type_,
                status,
                reason,
                message,
                last_transition_time: now,
                last_update_time: now,
            });
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: &str) -> bool {
        matches!(self.condition(type_), Some(c) if c.status == ConditionStatus::True)
    }

    pub fn retry_count(&self) -> u32 {
        self.details
            .get("retryCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    pub fn set_retry_count(&mut self, n: u32) {
        self.details
            .insert("retryCount".to_string(), serde_json::json!(n));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_preserves_transition_time_when_status_unchanged() {
        let mut s = Status::default();
        s.upsert_condition("Ready", ConditionStatus::True, None, None);
        let t1 = s.condition("Ready").unwrap().last_transition_time;
        s.upsert_condition("Ready", ConditionStatus::True, Some("still ok".into()), None);
        let t2 = s.condition("Ready").unwrap().last_transition_time;
        assert_eq!(t1, t2);
    }

    #[test]
    fn upsert_bumps_transition_time_when_status_changes() {
        let mut s = Status::default();
        s.upsert_condition("Ready", ConditionStatus::False, None, None);
        let t1 = s.condition("Ready").unwrap().last_transition_time;
        std::thread::sleep(std::time::Duration::from_millis(2));
        s.upsert_condition("Ready", ConditionStatus::True, None, None);
        let t2 = s.condition("Ready").unwrap().last_transition_time;
        assert!(t2 >= t1);
        assert_eq!(s.conditions.len(), 1);
    }
}
