//! Policy resolver — turns a judgment into a community-shaped plan.
//!
//! Pure: no I/O. Returns `None` when the community's policy says to do
//! nothing, otherwise a plan with the action clamped to the community's
//! ceiling. Severity and violation metadata survive the clamp so the
//! audit trail reflects what was actually detected.

use crate::moderation::types::{EffectivePlan, Judgment};
use crate::storage::CommunityPolicy;

/// Resolve a judgment against a community's policy.
pub fn resolve(judgment: &Judgment, policy: &CommunityPolicy) -> Option<EffectivePlan> {
    if !policy.enabled || judgment.safe {
        return None;
    }
    if judgment.severity < policy.severity_threshold {
        return None;
    }

    let action = judgment.action.min(policy.action_ceiling);

    Some(EffectivePlan {
        action,
        severity: judgment.severity,
        violations: judgment.violations.clone(),
        reason: judgment.reason.clone(),
        dm_notice: policy.dm_on_action,
        public_notice: policy.public_warnings,
    })
}
