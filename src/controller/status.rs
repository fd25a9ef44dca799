//! Phase bookkeeping and status conditions.

use crate::crd::{Condition, RedisPhase, RedisReplicationStatus};

/// Reason of the Ready condition after a converged pass.
pub const CONVERGED_REASON: &str = "Converged";

/// Phase to record at the start of a pass.
///
/// Unset becomes `creating`. `running` becomes `scaling` once the spec
/// generation moves past the one last marked running. Anything else is kept.
pub fn advance_phase(status: Option<&RedisReplicationStatus>, generation: Option<i64>) -> RedisPhase {
    let observed = status.and_then(|s| s.observed_generation);
    match status.and_then(|s| s.phase) {
        None => RedisPhase::Creating,
        Some(RedisPhase::Running) if generation != observed => RedisPhase::Scaling,
        Some(phase) => phase,
    }
}

/// Builder for managing conditions list
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    changed: bool,
}

impl ConditionBuilder {
    /// Start from an existing conditions list
    pub fn from_existing(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            changed: false,
        }
    }

    /// Add or update a condition
    ///
    /// A condition whose status, reason and message are unchanged is left as
    /// is so its transition time stays put.
    pub fn set(&mut self, condition: Condition) -> &mut Self {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status != condition.status
                || existing.reason != condition.reason
                || existing.message != condition.message
                || existing.observed_generation != condition.observed_generation
            {
                *existing = condition;
                self.changed = true;
            }
        } else {
            self.conditions.push(condition);
            self.changed = true;
        }
        self
    }

    /// Set Ready condition
    pub fn ready(
        &mut self,
        ready: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> &mut Self {
        self.set(Condition::ready(ready, reason, message, generation))
    }

    /// Whether any `set` modified the list
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Build the conditions list
    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .is_some_and(|c| c.status == "True")
}

/// Get the reason for a condition
pub fn get_condition_reason<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a str> {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .map(|c| c.reason.as_str())
}
