//! Enforcement coordinator — carries out an effective plan.
//!
//! Every step is best-effort: a failed delete still attempts the timeout,
//! a blocked DM still posts the public notice. Failures are logged where
//! they occur and reflected in the execution report, never propagated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::moderation::types::{ActionKind, EffectivePlan, ExecutionReport, MessageContext};
use crate::storage::{AuditEntry, ModStore};
use crate::transport::ChatTransport;

/// How long a public channel warning stays up.
const PUBLIC_NOTICE_TTL: Duration = Duration::from_secs(10);
/// Warning total at which the auto-timeout fires.
const ESCALATION_THRESHOLD: u32 = 5;
/// Auto-timeout length at the warning threshold.
const ESCALATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub struct EnforcementCoordinator {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn ModStore>,
}

impl EnforcementCoordinator {
    pub fn new(transport: Arc<dyn ChatTransport>, store: Arc<dyn ModStore>) -> Self {
        Self { transport, store }
    }

    /// Execute a plan against a message. Always returns a report; nothing
    /// here can fail the pipeline.
    pub async fn apply(&self, plan: &EffectivePlan, ctx: &MessageContext) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        if plan.action >= ActionKind::Delete {
            match self
                .transport
                .delete_message(&ctx.channel_id, &ctx.message_id)
                .await
            {
                Ok(()) => report.deleted = true,
                Err(e) => warn!(message_id = %ctx.message_id, error = %e, "Failed to delete message"),
            }
        }

        if plan.action == ActionKind::Timeout {
            let duration = timeout_duration(plan.severity);
            match self
                .transport
                .timeout_member(
                    &ctx.community_id,
                    &ctx.sender_id,
                    duration,
                    &format!("AutoMod: {}", plan.reason),
                )
                .await
            {
                Ok(()) => report.timed_out_for = Some(duration),
                Err(e) => warn!(user_id = %ctx.sender_id, error = %e, "Failed to timeout member"),
            }
        }

        if plan.dm_notice {
            let text = dm_text(plan, ctx);
            match self.transport.send_direct_notice(&ctx.sender_id, &text).await {
                Ok(()) => report.dm_sent = true,
                // User may simply have DMs closed
                Err(e) => warn!(user_id = %ctx.sender_id, error = %e, "Failed to DM sender"),
            }
        }

        // Public nudge only when nothing stronger than a warning happened
        if plan.action == ActionKind::Warn && plan.public_notice {
            let text = format!(
                "<@{}>, please be mindful of the community rules.",
                ctx.sender_id
            );
            match self
                .transport
                .send_channel_notice(&ctx.channel_id, &text, Some(PUBLIC_NOTICE_TTL))
                .await
            {
                Ok(()) => report.public_notice_sent = true,
                Err(e) => warn!(channel_id = %ctx.channel_id, error = %e, "Failed to post notice"),
            }
        }

        let mut audit = AuditEntry::automatic(
            &ctx.community_id,
            &ctx.sender_id,
            plan.action,
            format!("{}: {}", violation_labels(plan), plan.reason),
        );
        if let Some(duration) = report.timed_out_for {
            audit = audit.with_duration(format_duration(duration));
        }
        match self.store.append_audit(&audit).await {
            Ok(()) => report.audit_recorded = true,
            Err(e) => warn!(community_id = %ctx.community_id, error = %e, "Failed to record audit entry"),
        }

        if plan.action == ActionKind::Warn {
            match self
                .record_warning(&ctx.community_id, &ctx.sender_id, ctx.sender_timeout_eligible)
                .await
            {
                Ok((total, escalated)) => {
                    report.warning_total = Some(total);
                    report.escalated = escalated;
                }
                Err(e) => {
                    warn!(user_id = %ctx.sender_id, error = %e, "Failed to record warning")
                }
            }
        }

        info!(
            community_id = %ctx.community_id,
            user_id = %ctx.sender_id,
            action = %plan.action,
            severity = plan.severity,
            deleted = report.deleted,
            "Enforcement applied"
        );

        report
    }

    /// Record one warning for a user and escalate exactly when the total
    /// reaches the threshold. Shared by the pipeline and the manual warn
    /// surface so both count against the same ledger.
    pub async fn record_warning(
        &self,
        community_id: &str,
        user_id: &str,
        timeout_eligible: bool,
    ) -> Result<(u32, bool), crate::error::StorageError> {
        let total = self.store.increment_warnings(community_id, user_id).await?;

        if total != ESCALATION_THRESHOLD || !timeout_eligible {
            return Ok((total, false));
        }

        let reason = format!("Auto-timeout: reached {ESCALATION_THRESHOLD} warnings");
        match self
            .transport
            .timeout_member(community_id, user_id, ESCALATION_TIMEOUT, &reason)
            .await
        {
            Ok(()) => {
                let audit = AuditEntry::automatic(community_id, user_id, ActionKind::Timeout, reason)
                    .with_duration(format_duration(ESCALATION_TIMEOUT));
                if let Err(e) = self.store.append_audit(&audit).await {
                    warn!(user_id, error = %e, "Failed to record escalation audit entry");
                }
                let notice = format!(
                    "You have been timed out for {} after reaching {ESCALATION_THRESHOLD} warnings.",
                    format_duration(ESCALATION_TIMEOUT)
                );
                if let Err(e) = self.transport.send_direct_notice(user_id, &notice).await {
                    warn!(user_id, error = %e, "Failed to send escalation notice");
                }
                info!(community_id, user_id, total, "Warning threshold escalation");
                Ok((total, true))
            }
            Err(e) => {
                warn!(user_id, error = %e, "Escalation timeout failed");
                Ok((total, false))
            }
        }
    }
}

/// Timeout length for a severity. Severities outside the timeout band are
/// clamped into it.
fn timeout_duration(severity: u8) -> Duration {
    let secs = match severity.clamp(4, 10) {
        4 => 60,
        5 => 5 * 60,
        6 => 15 * 60,
        7 => 60 * 60,
        8 => 6 * 60 * 60,
        9 => 24 * 60 * 60,
        _ => 7 * 24 * 60 * 60,
    };
    Duration::from_secs(secs)
}

fn violation_labels(plan: &EffectivePlan) -> String {
    plan.violations
        .iter()
        .map(|v| v.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn dm_text(plan: &EffectivePlan, ctx: &MessageContext) -> String {
    let community = ctx
        .community_name
        .as_deref()
        .unwrap_or(ctx.community_id.as_str());
    format!(
        "Your message in {community} was flagged by automated moderation.\n\
         Reason: {}\nAction: {}\n\
         Repeated violations may result in more severe actions.",
        plan.reason, plan.action
    )
}

fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days} day{}", if days > 1 { "s" } else { "" })
    } else if hours > 0 {
        format!("{hours} hour{}", if hours > 1 { "s" } else { "" })
    } else if minutes > 0 {
        format!("{minutes} minute{}", if minutes > 1 { "s" } else { "" })
    } else {
        format!("{seconds} second{}", if seconds > 1 { "s" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::TransportError;
    use crate::moderation::types::ViolationKind;
    use crate::storage::LibSqlStore;

    #[derive(Debug, PartialEq)]
    enum Call {
        Delete(String),
        Timeout(String, Duration),
        Dm(String),
        Notice(String, Option<Duration>),
    }

    /// Transport that records calls; individual operations can be failed.
    struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        fail_delete: bool,
        fail_dm: bool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_delete: false,
                fail_dm: false,
            })
        }

        fn failing_dm() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_delete: false,
                fail_dm: true,
            })
        }

        fn failing_delete() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_delete: true,
                fail_dm: false,
            })
        }

        fn calls(&self) -> Vec<Call> {
            std::mem::take(&mut self.calls.lock().unwrap())
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn delete_message(
            &self,
            _channel_id: &str,
            message_id: &str,
        ) -> Result<(), TransportError> {
            if self.fail_delete {
                return Err(TransportError::NotFound {
                    target: message_id.to_string(),
                });
            }
            self.calls
                .lock()
                .unwrap()
                .push(Call::Delete(message_id.to_string()));
            Ok(())
        }

        async fn timeout_member(
            &self,
            _community_id: &str,
            user_id: &str,
            duration: Duration,
            _reason: &str,
        ) -> Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Timeout(user_id.to_string(), duration));
            Ok(())
        }

        async fn send_direct_notice(
            &self,
            user_id: &str,
            _text: &str,
        ) -> Result<(), TransportError> {
            if self.fail_dm {
                return Err(TransportError::Unreachable {
                    target: user_id.to_string(),
                });
            }
            self.calls.lock().unwrap().push(Call::Dm(user_id.to_string()));
            Ok(())
        }

        async fn send_channel_notice(
            &self,
            channel_id: &str,
            _text: &str,
            auto_expire: Option<Duration>,
        ) -> Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Notice(channel_id.to_string(), auto_expire));
            Ok(())
        }
    }

    fn plan(action: ActionKind, severity: u8) -> EffectivePlan {
        EffectivePlan {
            action,
            severity,
            violations: BTreeSet::from([ViolationKind::Toxicity]),
            reason: "harassment".to_string(),
            dm_notice: true,
            public_notice: true,
        }
    }

    fn ctx() -> MessageContext {
        MessageContext::new("m1", "g1", "c1", "u1")
    }

    async fn coordinator(
        transport: Arc<RecordingTransport>,
    ) -> (EnforcementCoordinator, Arc<LibSqlStore>) {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        (
            EnforcementCoordinator::new(transport, store.clone()),
            store,
        )
    }

    #[test]
    fn timeout_durations_follow_the_severity_table() {
        assert_eq!(timeout_duration(4), Duration::from_secs(60));
        assert_eq!(timeout_duration(5), Duration::from_secs(300));
        assert_eq!(timeout_duration(6), Duration::from_secs(900));
        assert_eq!(timeout_duration(7), Duration::from_secs(3600));
        assert_eq!(timeout_duration(8), Duration::from_secs(21600));
        assert_eq!(timeout_duration(9), Duration::from_secs(86400));
        assert_eq!(timeout_duration(10), Duration::from_secs(604800));
        // Out-of-band severities clamp into the table
        assert_eq!(timeout_duration(1), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn warn_sends_transient_public_notice_and_records_warning() {
        let transport = RecordingTransport::new();
        let (coord, store) = coordinator(transport.clone()).await;

        let report = coord.apply(&plan(ActionKind::Warn, 3), &ctx()).await;
        assert!(!report.deleted);
        assert!(report.dm_sent);
        assert!(report.public_notice_sent);
        assert!(report.audit_recorded);
        assert_eq!(report.warning_total, Some(1));
        assert!(!report.escalated);

        let calls = transport.calls();
        assert!(calls.contains(&Call::Notice("c1".to_string(), Some(PUBLIC_NOTICE_TTL))));
        assert_eq!(store.get_warning_count("g1", "u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_suppresses_public_notice_and_warning_count() {
        let transport = RecordingTransport::new();
        let (coord, store) = coordinator(transport.clone()).await;

        let report = coord.apply(&plan(ActionKind::Delete, 5), &ctx()).await;
        assert!(report.deleted);
        assert!(!report.public_notice_sent);
        assert!(report.warning_total.is_none());

        assert_eq!(store.get_warning_count("g1", "u1").await.unwrap(), 0);
        assert!(transport.calls().contains(&Call::Delete("m1".to_string())));
    }

    #[tokio::test]
    async fn timeout_action_deletes_then_mutes_for_severity_duration() {
        let transport = RecordingTransport::new();
        let (coord, _) = coordinator(transport.clone()).await;

        let report = coord.apply(&plan(ActionKind::Timeout, 7), &ctx()).await;
        assert!(report.deleted);
        assert_eq!(report.timed_out_for, Some(Duration::from_secs(3600)));

        let calls = transport.calls();
        assert_eq!(calls[0], Call::Delete("m1".to_string()));
        assert_eq!(
            calls[1],
            Call::Timeout("u1".to_string(), Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn failed_delete_still_runs_remaining_steps() {
        let transport = RecordingTransport::failing_delete();
        let (coord, _) = coordinator(transport.clone()).await;

        let report = coord.apply(&plan(ActionKind::Timeout, 5), &ctx()).await;
        assert!(!report.deleted);
        assert!(report.timed_out_for.is_some());
        assert!(report.dm_sent);
        assert!(report.audit_recorded);
    }

    #[tokio::test]
    async fn blocked_dm_is_non_fatal() {
        let transport = RecordingTransport::failing_dm();
        let (coord, _) = coordinator(transport).await;

        let report = coord.apply(&plan(ActionKind::Warn, 3), &ctx()).await;
        assert!(!report.dm_sent);
        assert!(report.public_notice_sent);
        assert_eq!(report.warning_total, Some(1));
    }

    #[tokio::test]
    async fn fifth_warning_escalates_exactly_once() {
        let transport = RecordingTransport::new();
        let (coord, _) = coordinator(transport.clone()).await;

        for _ in 0..4 {
            let report = coord.apply(&plan(ActionKind::Warn, 3), &ctx()).await;
            assert!(!report.escalated);
        }
        transport.calls();

        let fifth = coord.apply(&plan(ActionKind::Warn, 3), &ctx()).await;
        assert_eq!(fifth.warning_total, Some(5));
        assert!(fifth.escalated);
        assert!(transport.calls().contains(&Call::Timeout(
            "u1".to_string(),
            Duration::from_secs(3600)
        )));

        // The sixth warning does not re-fire the escalation
        let sixth = coord.apply(&plan(ActionKind::Warn, 3), &ctx()).await;
        assert_eq!(sixth.warning_total, Some(6));
        assert!(!sixth.escalated);
        assert!(!transport
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Timeout(_, _))));
    }

    #[tokio::test]
    async fn escalation_skips_protected_members() {
        let transport = RecordingTransport::new();
        let (coord, store) = coordinator(transport.clone()).await;

        for _ in 0..4 {
            store.increment_warnings("g1", "u1").await.unwrap();
        }
        let mut ctx = ctx();
        ctx.sender_timeout_eligible = false;

        let report = coord.apply(&plan(ActionKind::Warn, 3), &ctx).await;
        assert_eq!(report.warning_total, Some(5));
        assert!(!report.escalated);
    }

    #[tokio::test]
    async fn audit_entry_captures_violations_and_duration() {
        let transport = RecordingTransport::new();
        let (coord, store) = coordinator(transport).await;

        coord.apply(&plan(ActionKind::Timeout, 8), &ctx()).await;

        let entries = store.audit_for_user("g1", "u1", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, ActionKind::Timeout);
        assert_eq!(entries[0].actor_id, crate::storage::SYSTEM_ACTOR);
        assert!(entries[0].reason.as_deref().unwrap().contains("TOXICITY"));
        assert_eq!(entries[0].duration.as_deref(), Some("6 hours"));
    }

    #[test]
    fn durations_format_in_largest_unit() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1 minute");
        assert_eq!(format_duration(Duration::from_secs(300)), "5 minutes");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1 hour");
        assert_eq!(format_duration(Duration::from_secs(604800)), "7 days");
    }
}
