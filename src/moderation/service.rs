//! Automod service — the full per-message pipeline.
//!
//! Gate on policy, decide, resolve, enforce, then post a log-channel
//! summary. One entry point per incoming message.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::moderation::enforce::EnforcementCoordinator;
use crate::moderation::engine::DecisionEngine;
use crate::moderation::policy;
use crate::moderation::types::{EffectivePlan, ExecutionReport, Judgment, MessageContext};
use crate::storage::{CommunityPolicy, ModStore};
use crate::transport::ChatTransport;

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationOutcome {
    /// Policy gating skipped the message before any analysis.
    Skipped(SkipReason),
    /// Analysis ran but no enforcement was warranted.
    Clean(Judgment),
    /// Enforcement ran.
    Enforced {
        judgment: Judgment,
        plan: EffectivePlan,
        report: ExecutionReport,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    ModeratorImmunity,
    IgnoredChannel,
    IgnoredRole,
}

pub struct AutomodService {
    engine: DecisionEngine,
    enforcement: EnforcementCoordinator,
    store: Arc<dyn ModStore>,
    transport: Arc<dyn ChatTransport>,
}

impl AutomodService {
    pub fn new(
        engine: DecisionEngine,
        store: Arc<dyn ModStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            engine,
            enforcement: EnforcementCoordinator::new(transport.clone(), store.clone()),
            store,
            transport,
        }
    }

    /// Run the full pipeline for one message.
    pub async fn handle_message(
        &self,
        text: &str,
        ctx: &MessageContext,
    ) -> Result<ModerationOutcome> {
        let policy = self.store.get_policy(&ctx.community_id).await?;

        if let Some(reason) = gate(&policy, ctx) {
            debug!(community_id = %ctx.community_id, ?reason, "Message skipped");
            return Ok(ModerationOutcome::Skipped(reason));
        }

        let judgment = self.engine.decide(text, ctx).await;

        let Some(plan) = policy::resolve(&judgment, &policy) else {
            return Ok(ModerationOutcome::Clean(judgment));
        };

        info!(
            community_id = %ctx.community_id,
            user_id = %ctx.sender_id,
            source = judgment.source.label(),
            severity = judgment.severity,
            action = %plan.action,
            "Violation detected"
        );

        let report = self.enforcement.apply(&plan, ctx).await;

        if let Some(log_channel) = &policy.log_channel {
            let summary = log_summary(&judgment, &plan, &report, ctx);
            if let Err(e) = self
                .transport
                .send_channel_notice(log_channel, &summary, None)
                .await
            {
                warn!(channel_id = %log_channel, error = %e, "Failed to post log summary");
            }
        }

        Ok(ModerationOutcome::Enforced {
            judgment,
            plan,
            report,
        })
    }

    /// Shared warning ledger, used by the manual warn surface.
    pub fn enforcement(&self) -> &EnforcementCoordinator {
        &self.enforcement
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }
}

fn gate(policy: &CommunityPolicy, ctx: &MessageContext) -> Option<SkipReason> {
    if !policy.enabled {
        return Some(SkipReason::Disabled);
    }
    if policy.moderator_immunity && ctx.sender_is_moderator {
        return Some(SkipReason::ModeratorImmunity);
    }
    if policy.ignored_channels.contains(&ctx.channel_id) {
        return Some(SkipReason::IgnoredChannel);
    }
    if ctx
        .sender_roles
        .iter()
        .any(|role| policy.ignored_roles.contains(role))
    {
        return Some(SkipReason::IgnoredRole);
    }
    None
}

fn log_summary(
    judgment: &Judgment,
    plan: &EffectivePlan,
    report: &ExecutionReport,
    ctx: &MessageContext,
) -> String {
    let violations = plan
        .violations
        .iter()
        .map(|v| v.label())
        .collect::<Vec<_>>()
        .join(", ");
    let mut steps = Vec::new();
    if report.deleted {
        steps.push("message deleted".to_string());
    }
    if let Some(duration) = report.timed_out_for {
        steps.push(format!("timed out for {}s", duration.as_secs()));
    }
    if report.escalated {
        steps.push("warning threshold escalation".to_string());
    }
    let taken = if steps.is_empty() {
        "warning issued".to_string()
    } else {
        steps.join(" + ")
    };

    format!(
        "AutoMod: <@{}> in <#{}> | {} (severity {}/10, {}) | {} | {}",
        ctx.sender_id,
        ctx.channel_id,
        violations,
        plan.severity,
        judgment.source.label(),
        plan.reason,
        taken
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::moderation::types::ActionKind;

    #[test]
    fn gate_order_is_enabled_then_immunity_then_ignores() {
        let mut policy = CommunityPolicy::defaults("g1");
        let mut ctx = MessageContext::new("m1", "g1", "c1", "u1");
        ctx.sender_is_moderator = true;

        assert_eq!(gate(&policy, &ctx), Some(SkipReason::Disabled));

        policy.enabled = true;
        assert_eq!(gate(&policy, &ctx), Some(SkipReason::ModeratorImmunity));

        policy.moderator_immunity = false;
        assert_eq!(gate(&policy, &ctx), None);

        policy.ignored_channels = vec!["c1".to_string()];
        assert_eq!(gate(&policy, &ctx), Some(SkipReason::IgnoredChannel));

        policy.ignored_channels.clear();
        policy.ignored_roles = vec!["r1".to_string()];
        ctx.sender_roles = vec!["r2".to_string(), "r1".to_string()];
        assert_eq!(gate(&policy, &ctx), Some(SkipReason::IgnoredRole));
    }

    #[test]
    fn log_summary_names_violations_and_steps() {
        let judgment = Judgment::unsafe_verdict(
            std::collections::BTreeSet::from([crate::moderation::types::ViolationKind::Spam]),
            6,
            "spam wave",
            ActionKind::Timeout,
            crate::moderation::types::JudgmentSource::Combined,
        );
        let plan = EffectivePlan {
            action: ActionKind::Timeout,
            severity: 6,
            violations: judgment.violations.clone(),
            reason: judgment.reason.clone(),
            dm_notice: true,
            public_notice: true,
        };
        let report = ExecutionReport {
            deleted: true,
            timed_out_for: Some(std::time::Duration::from_secs(900)),
            ..Default::default()
        };
        let ctx = MessageContext::new("m1", "g1", "c1", "u1");

        let summary = log_summary(&judgment, &plan, &report, &ctx);
        assert!(summary.contains("SPAM"));
        assert!(summary.contains("severity 6/10"));
        assert!(summary.contains("message deleted + timed out for 900s"));
        assert!(summary.contains("combined"));
    }
}
