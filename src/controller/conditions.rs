//! Condition management helpers for RestApi and Redis status

use chrono::Utc;

use crate::crd::{ConditionStatus, StatusCondition};

/// Overall readiness of the resource
pub const CONDITION_TYPE_READY: &str = "Ready";

pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_AWAITING_EXTERNAL_ADDRESS: &str = "AwaitingExternalAddress";
pub const REASON_DEPENDENCY_PENDING: &str = "DependencyPending";
pub const REASON_DEPENDENCY_NOT_FOUND: &str = "DependencyNotFound";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Update or add a condition to the conditions list
///
/// `lastProbeTime` is refreshed on every call. `lastTransitionTime` only moves
/// when the status value changes.
pub fn set_condition(
    conditions: &mut Vec<StatusCondition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = now.clone();
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.last_probe_time = now;
    } else {
        conditions.push(StatusCondition {
            type_: type_.to_string(),
            status,
            last_probe_time: now.clone(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

/// Whether two condition lists agree on everything except `lastProbeTime`
pub fn conditions_match(current: &[StatusCondition], next: &[StatusCondition]) -> bool {
    let untimed = |c: &StatusCondition| StatusCondition {
        last_probe_time: String::new(),
        ..c.clone()
    };
    current.len() == next.len()
        && current
            .iter()
            .zip(next)
            .all(|(a, b)| untimed(a) == untimed(b))
}

/// Find a condition by type
pub fn find_condition<'a>(
    conditions: &'a [StatusCondition],
    type_: &str,
) -> Option<&'a StatusCondition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check if a condition is Healthy
pub fn is_condition_healthy(conditions: &[StatusCondition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == ConditionStatus::Healthy)
        .unwrap_or(false)
}
