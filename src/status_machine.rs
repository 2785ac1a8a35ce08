// The resource status machine: the allowed phase transition graph plus the
// side effects a transition must apply.

use crate::error::{Error, Result};
use crate::event_bus::EventBus;
use crate::models::status::ConditionStatus;
use crate::models::{Phase, Resource, Status};

/// Returns `true` if `from -> to` is an edge in the resource lifecycle's transition
/// graph. Any phase may transition to `Unknown`, and `Unknown` may transition
/// to any phase; `Terminating` is terminal otherwise.
pub fn is_allowed(from: Phase, to: Phase) -> bool {
    use Phase::*;
    if to == Unknown || from == Unknown {
        return true;
    }
    matches!(
        (from, to),
        (Pending, Initializing)
            | (Pending, Failed)
            | (Pending, Terminating)
            | (Initializing, Running)
            | (Initializing, Failed)
            | (Initializing, Terminating)
            | (Running, Degraded)
            | (Running, Failed)
            | (Running, Terminating)
            | (Degraded, Running)
            | (Degraded, Failed)
            | (Degraded, Terminating)
            | (Failed, Initializing)
            | (Failed, Terminating)
    )
}

/// Attempt a phase transition on `resource`'s status, applying the
/// required side-effect conditions, and emit
/// `phase.changed`/`<kind>.reconciled`-adjacent `StatusTransitionEvent` on
/// `bus`. Fails with [`Error::InvalidStateTransition`] if the edge isn't
/// allowed.
pub fn transition(resource: &mut Resource, to: Phase, bus: &EventBus) -> Result<()> {
    let status = resource.status.get_or_insert_with(Status::default);
    let from = status.phase;

    if from == to {
        return Ok(());
    }
    if !is_allowed(from, to) {
        return Err(Error::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    status.phase = to;
    match to {
        Phase::Failed => {
            status.upsert_condition("Error", ConditionStatus::True, None, None);
            status.last_failure_time = Some(chrono::Utc::now());
        }
        Phase::Running => {
            status.upsert_condition("Ready", ConditionStatus::True, None, None);
            status.upsert_condition("Available", ConditionStatus::True, None, None);
            status.last_success_time = Some(chrono::Utc::now());
        }
        Phase::Degraded => {
            status.upsert_condition("Ready", ConditionStatus::True, None, None);
            status.upsert_condition("Degraded", ConditionStatus::True, None, None);
        }
        _ => {}
    }

    bus.publish(
        "phase.changed",
        serde_json::json!({
            "key": resource.key(),
            "from": from.to_string(),
            "to": to.to_string(),
        }),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Kind, ObjectMeta};

    fn new_resource() -> Resource {
        Resource::new("mastra/v1", Kind::Tool, ObjectMeta::new("x"), serde_json::json!({}))
    }

    #[test]
    fn pending_to_running_is_rejected_directly() {
        let mut r = new_resource();
        r.status = Some(Status::default());
        let bus = EventBus::new();
        let err = transition(&mut r, Phase::Running, &bus).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn pending_initializing_running_sets_ready_and_available() {
        let mut r = new_resource();
        let bus = EventBus::new();
        transition(&mut r, Phase::Initializing, &bus).unwrap();
        transition(&mut r, Phase::Running, &bus).unwrap();
        let status = r.status.unwrap();
        assert!(status.is_true("Ready"));
        assert!(status.is_true("Available"));
    }

    #[test]
    fn any_phase_can_go_to_unknown() {
        let mut r = new_resource();
        let bus = EventBus::new();
        transition(&mut r, Phase::Unknown, &bus).unwrap();
    }

    #[test]
    fn unknown_can_go_to_any_phase() {
        let mut r = new_resource();
        let bus = EventBus::new();
        transition(&mut r, Phase::Unknown, &bus).unwrap();
        transition(&mut r, Phase::Initializing, &bus).unwrap();
        let mut r2 = new_resource();
        transition(&mut r2, Phase::Unknown, &bus).unwrap();
        transition(&mut r2, Phase::Running, &bus).unwrap();
        assert!(r2.status.unwrap().is_true("Ready"));
    }

    #[test]
    fn degraded_to_running_is_allowed() {
        let mut r = new_resource();
        let bus = EventBus::new();
        transition(&mut r, Phase::Initializing, &bus).unwrap();
        transition(&mut r, Phase::Running, &bus).unwrap();
        transition(&mut r, Phase::Degraded, &bus).unwrap();
        transition(&mut r, Phase::Running, &bus).unwrap();
    }
}
